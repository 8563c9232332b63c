//! Per-shop order status flow.
//!
//! A shop's [`OrderStatusFlow`] is a small directed graph: each node is a legal
//! order status value, and each action on a node names a status the order may
//! move to next. Final nodes accept no further transitions. The engine is pure:
//! it only answers whether `current -> next` is admissible under a given flow.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Node `type` marking a cancellation. Entering a final cancellation node
/// hands the order's reserved stock back.
pub const CANCELLED_TYPE: &str = "cancelled";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusFlow {
    pub statuses: Vec<StatusNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNode {
    pub value: i32,
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub actions: Vec<StatusAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAction {
    pub name: String,
    pub next_status: i32,
    #[serde(default)]
    pub next_status_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("current status {0} is not part of the shop's status flow")]
    UnknownCurrentStatus(i32),
    #[error("status {0} is terminal and cannot change")]
    TerminalStatus(i32),
    #[error("transition from status {from} to {to} is not allowed")]
    IllegalTransition { from: i32, to: i32 },
    #[error("invalid status flow: {0}")]
    Invalid(String),
}

impl StatusNode {
    pub fn is_cancellation(&self) -> bool {
        self.is_final && self.kind == CANCELLED_TYPE
    }
}

impl OrderStatusFlow {
    pub fn node(&self, value: i32) -> Option<&StatusNode> {
        self.statuses.iter().find(|n| n.value == value)
    }

    pub fn contains(&self, value: i32) -> bool {
        self.node(value).is_some()
    }

    /// Status assigned to freshly created orders: the first non-final node.
    pub fn initial_status(&self) -> Option<i32> {
        self.statuses.iter().find(|n| !n.is_final).map(|n| n.value)
    }

    /// Whether `value` is a final node. Unknown values count as non-final.
    pub fn is_final(&self, value: i32) -> bool {
        self.node(value).map(|n| n.is_final).unwrap_or(false)
    }

    /// Admit or reject `current -> next`, returning the target node on success.
    pub fn check_transition(&self, current: i32, next: i32) -> Result<&StatusNode, FlowError> {
        let node = self.node(current).ok_or(FlowError::UnknownCurrentStatus(current))?;
        if node.is_final {
            return Err(FlowError::TerminalStatus(current));
        }
        // No self-loops, even if an action lists one.
        if next == current || !node.actions.iter().any(|a| a.next_status == next) {
            return Err(FlowError::IllegalTransition { from: current, to: next });
        }
        self.node(next).ok_or(FlowError::IllegalTransition { from: current, to: next })
    }

    /// The "unfinished" projection: every non-final status value, in flow order.
    pub fn unfinished_statuses(&self) -> Vec<i32> {
        self.statuses.iter().filter(|n| !n.is_final).map(|n| n.value).collect()
    }

    pub fn values(&self) -> Vec<i32> {
        self.statuses.iter().map(|n| n.value).collect()
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        let mut seen = HashSet::new();
        for node in &self.statuses {
            if !seen.insert(node.value) {
                return Err(FlowError::Invalid(format!("duplicate status value {}", node.value)));
            }
            if node.label.trim().is_empty() {
                return Err(FlowError::Invalid(format!("status {} has an empty label", node.value)));
            }
        }
        if self.initial_status().is_none() {
            return Err(FlowError::Invalid("flow needs at least one non-final status".into()));
        }
        for node in &self.statuses {
            if node.is_final && !node.actions.is_empty() {
                return Err(FlowError::Invalid(format!("final status {} cannot have actions", node.value)));
            }
            for action in &node.actions {
                if action.next_status == node.value {
                    return Err(FlowError::Invalid(format!("status {} has a self-loop", node.value)));
                }
                if !seen.contains(&action.next_status) {
                    return Err(FlowError::Invalid(format!(
                        "action '{}' on status {} targets unknown status {}",
                        action.name, node.value, action.next_status
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for OrderStatusFlow {
    /// Installed on shops created without a flow of their own.
    fn default() -> Self {
        fn action(name: &str, next_status: i32, next_status_label: &str) -> StatusAction {
            StatusAction { name: name.into(), next_status, next_status_label: next_status_label.into() }
        }
        Self {
            statuses: vec![
                StatusNode {
                    value: 0,
                    label: "待处理".into(),
                    kind: "pending".into(),
                    is_final: false,
                    actions: vec![action("接单", 1, "已接单"), action("取消", 10, "已取消")],
                },
                StatusNode {
                    value: 1,
                    label: "已接单".into(),
                    kind: "accepted".into(),
                    is_final: false,
                    actions: vec![action("完成", 9, "已完成"), action("取消", 10, "已取消")],
                },
                StatusNode { value: 9, label: "已完成".into(), kind: "completed".into(), is_final: true, actions: vec![] },
                StatusNode { value: 10, label: "已取消".into(), kind: CANCELLED_TYPE.into(), is_final: true, actions: vec![] },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flow_is_valid() {
        let flow = OrderStatusFlow::default();
        flow.validate().unwrap();
        assert_eq!(flow.initial_status(), Some(0));
        assert_eq!(flow.unfinished_statuses(), vec![0, 1]);
        assert!(flow.node(10).unwrap().is_cancellation());
        assert!(!flow.node(9).unwrap().is_cancellation());
    }

    #[test]
    fn test_legal_transitions() {
        let flow = OrderStatusFlow::default();
        assert_eq!(flow.check_transition(0, 1).unwrap().value, 1);
        assert_eq!(flow.check_transition(0, 10).unwrap().value, 10);
        assert_eq!(flow.check_transition(1, 9).unwrap().value, 9);
    }

    #[test]
    fn test_skipping_a_step_is_illegal() {
        let flow = OrderStatusFlow::default();
        assert_eq!(flow.check_transition(0, 9), Err(FlowError::IllegalTransition { from: 0, to: 9 }));
    }

    #[test]
    fn test_terminal_rejects_everything() {
        let flow = OrderStatusFlow::default();
        assert_eq!(flow.check_transition(9, 0), Err(FlowError::TerminalStatus(9)));
        assert_eq!(flow.check_transition(10, 10), Err(FlowError::TerminalStatus(10)));
    }

    #[test]
    fn test_unknown_current_status() {
        let flow = OrderStatusFlow::default();
        assert_eq!(flow.check_transition(5, 1), Err(FlowError::UnknownCurrentStatus(5)));
    }

    #[test]
    fn test_self_loop_is_illegal_even_when_listed() {
        let mut flow = OrderStatusFlow::default();
        flow.statuses[0].actions.push(StatusAction { name: "again".into(), next_status: 0, next_status_label: String::new() });
        assert_eq!(flow.check_transition(0, 0), Err(FlowError::IllegalTransition { from: 0, to: 0 }));
        assert!(matches!(flow.validate(), Err(FlowError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_actions_admit_once() {
        let mut flow = OrderStatusFlow::default();
        flow.statuses[0].actions.push(StatusAction { name: "accept again".into(), next_status: 1, next_status_label: String::new() });
        assert!(flow.check_transition(0, 1).is_ok());
    }

    #[test]
    fn test_all_final_flow_has_no_unfinished() {
        let flow = OrderStatusFlow {
            statuses: vec![StatusNode { value: 1, label: "done".into(), kind: String::new(), is_final: true, actions: vec![] }],
        };
        assert!(flow.unfinished_statuses().is_empty());
        assert!(flow.initial_status().is_none());
        assert!(flow.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_action() {
        let mut flow = OrderStatusFlow::default();
        flow.statuses[1].actions.push(StatusAction { name: "ship".into(), next_status: 42, next_status_label: String::new() });
        assert!(matches!(flow.validate(), Err(FlowError::Invalid(msg)) if msg.contains("42")));
    }

    #[test]
    fn test_flow_json_shape() {
        let json = serde_json::to_value(OrderStatusFlow::default()).unwrap();
        let first = &json["statuses"][0];
        assert_eq!(first["value"], 0);
        assert_eq!(first["type"], "pending");
        assert_eq!(first["is_final"], false);
        assert_eq!(first["actions"][0]["next_status"], 1);
    }
}
