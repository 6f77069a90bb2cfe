//! 通用工具函数

/// 判断输入字段是否为非空白内容
pub fn is_present(value: &str) -> bool {
    !value.trim().is_empty()
}

/// 简单的邮箱格式检查
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
