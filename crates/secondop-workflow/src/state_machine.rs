//! 病例状态机
//!
//! 管理第二诊疗意见病例的生命周期状态转换规范

use secondop_core::CaseStatus;
use std::collections::HashSet;

/// 病例状态机
///
/// 规范路径为 DRAFT → SUBMITTED → PENDING → ASSIGNED → IN_PROGRESS →
/// COMPLETED；CANCELLED 可从任意非终态进入。状态接口采用宽松策略，
/// 非规范跳转不被拒绝，但会被记录，状态机在此提供判定依据。
#[derive(Debug)]
pub struct CaseStateMachine {
    transitions: HashSet<(CaseStatus, CaseStatus)>,
}

impl CaseStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashSet::new();

        // 规范推进路径
        transitions.insert((CaseStatus::Draft, CaseStatus::Submitted));
        transitions.insert((CaseStatus::Submitted, CaseStatus::Pending));
        transitions.insert((CaseStatus::Pending, CaseStatus::Assigned));
        transitions.insert((CaseStatus::Assigned, CaseStatus::InProgress));
        transitions.insert((CaseStatus::InProgress, CaseStatus::Completed));

        // 任意非终态可取消
        for from in Self::all_states() {
            if !from.is_terminal() {
                transitions.insert((from, CaseStatus::Cancelled));
            }
        }

        Self { transitions }
    }

    /// 检查状态转换是否在规范表内
    pub fn can_transition(&self, from: CaseStatus, to: CaseStatus) -> bool {
        self.transitions.contains(&(from, to))
    }

    /// 获取状态的所有规范后继
    pub fn successors(&self, from: CaseStatus) -> Vec<CaseStatus> {
        self.transitions
            .iter()
            .filter(|(f, _)| *f == from)
            .map(|(_, to)| *to)
            .collect()
    }

    /// 获取所有可能的状态
    pub fn all_states() -> Vec<CaseStatus> {
        vec![
            CaseStatus::Draft,
            CaseStatus::Submitted,
            CaseStatus::Pending,
            CaseStatus::Assigned,
            CaseStatus::InProgress,
            CaseStatus::Completed,
            CaseStatus::Cancelled,
        ]
    }
}

impl Default for CaseStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_transitions() {
        let sm = CaseStateMachine::new();

        assert!(sm.can_transition(CaseStatus::Draft, CaseStatus::Submitted));
        assert!(sm.can_transition(CaseStatus::Pending, CaseStatus::Assigned));
        assert!(sm.can_transition(CaseStatus::InProgress, CaseStatus::Completed));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        let sm = CaseStateMachine::new();

        for from in CaseStateMachine::all_states() {
            if from.is_terminal() {
                assert!(!sm.can_transition(from, CaseStatus::Cancelled));
            } else {
                assert!(sm.can_transition(from, CaseStatus::Cancelled));
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        let sm = CaseStateMachine::new();

        assert!(sm.successors(CaseStatus::Completed).is_empty());
        assert!(sm.successors(CaseStatus::Cancelled).is_empty());
    }

    #[test]
    fn test_non_canonical_jumps_detected() {
        let sm = CaseStateMachine::new();

        assert!(!sm.can_transition(CaseStatus::Submitted, CaseStatus::Completed));
        assert!(!sm.can_transition(CaseStatus::Completed, CaseStatus::Pending));
    }
}
