use crate::package::{InclusionPolicy, Package, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChangeDecision {
    /// 没有过期包
    NoChange,
    /// 过期数量发生变化，唯一需要通知用户的情况
    BecameOutdated { count: usize, packages: Vec<Package> },
    /// 过期数量与上次相同
    StillOutdated { count: usize, packages: Vec<Package> },
}

impl ChangeDecision {
    pub fn should_notify(&self) -> bool {
        matches!(self, ChangeDecision::BecameOutdated { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            ChangeDecision::NoChange => 0,
            ChangeDecision::BecameOutdated { count, .. }
            | ChangeDecision::StillOutdated { count, .. } => *count,
        }
    }

    pub fn packages(&self) -> &[Package] {
        match self {
            ChangeDecision::NoChange => &[],
            ChangeDecision::BecameOutdated { packages, .. }
            | ChangeDecision::StillOutdated { packages, .. } => packages.as_slice(),
        }
    }
}

/// 只比较数量，不比较具体是哪些包
pub fn reconcile(previous: &Snapshot, next: &Snapshot, policy: &InclusionPolicy) -> ChangeDecision {
    let prev_count = previous.outdated_count(policy);
    let packages: Vec<Package> = next.outdated(policy).cloned().collect();
    let next_count = packages.len();

    debug!("过期包数量: {} -> {}", prev_count, next_count);

    if next_count == 0 {
        ChangeDecision::NoChange
    } else if prev_count != next_count {
        ChangeDecision::BecameOutdated {
            count: next_count,
            packages,
        }
    } else {
        ChangeDecision::StillOutdated {
            count: next_count,
            packages,
        }
    }
}

/// 保留上一次快照并计算变化
#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    previous: Snapshot,
    policy: InclusionPolicy,
}

impl ReconciliationEngine {
    pub fn new(policy: InclusionPolicy) -> Self {
        Self {
            previous: Snapshot::default(),
            policy,
        }
    }

    pub fn policy(&self) -> InclusionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: InclusionPolicy) {
        if self.policy != policy {
            info!("包含依赖策略已更新: {}", policy.include_dependencies);
        }
        self.policy = policy;
    }

    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    /// 无论结果如何都用 next 替换保留的快照
    pub fn apply(&mut self, next: Snapshot) -> ChangeDecision {
        let decision = reconcile(&self.previous, &next, &self.policy);
        self.previous = next;
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::fixtures::formula;

    fn snapshot(outdated: &[&str]) -> Snapshot {
        Snapshot::new(
            outdated
                .iter()
                .map(|name| formula(name, true, true))
                .chain(std::iter::once(formula("git", false, true)))
                .collect(),
        )
    }

    #[test]
    fn test_zero_to_two_notifies() {
        let decision = reconcile(&snapshot(&[]), &snapshot(&["fzf", "vim"]), &InclusionPolicy::default());
        assert!(decision.should_notify());
        assert_eq!(decision.count(), 2);
        assert_eq!(decision.packages().len(), 2);
    }

    #[test]
    fn test_same_count_different_packages_does_not_notify() {
        let decision = reconcile(
            &snapshot(&["fzf", "vim"]),
            &snapshot(&["node", "wget"]),
            &InclusionPolicy::default(),
        );
        assert!(matches!(decision, ChangeDecision::StillOutdated { count: 2, .. }));
        assert!(!decision.should_notify());
    }

    #[test]
    fn test_clean_transition_is_no_change() {
        let decision = reconcile(&snapshot(&["fzf", "vim"]), &snapshot(&[]), &InclusionPolicy::default());
        assert_eq!(decision, ChangeDecision::NoChange);
        assert!(!decision.should_notify());
    }

    #[test]
    fn test_count_decrease_notifies() {
        let decision = reconcile(&snapshot(&["fzf", "vim"]), &snapshot(&["vim"]), &InclusionPolicy::default());
        assert!(matches!(decision, ChangeDecision::BecameOutdated { count: 1, .. }));
    }

    #[test]
    fn test_engine_second_apply_never_renotifies() {
        let mut engine = ReconciliationEngine::new(InclusionPolicy::default());
        let next = snapshot(&["fzf", "vim", "node"]);

        let first = engine.apply(next.clone());
        assert!(first.should_notify());

        let second = engine.apply(next);
        assert!(matches!(second, ChangeDecision::StillOutdated { count: 3, .. }));
    }

    #[test]
    fn test_engine_advances_on_no_change() {
        let mut engine = ReconciliationEngine::new(InclusionPolicy::default());
        engine.apply(snapshot(&["fzf"]));

        let clean = snapshot(&[]);
        assert_eq!(engine.apply(clean.clone()), ChangeDecision::NoChange);
        assert_eq!(engine.previous(), &clean);
    }

    #[test]
    fn test_policy_applies_to_both_sides() {
        let mut engine = ReconciliationEngine::new(InclusionPolicy::new(true));
        let next = Snapshot::new(vec![formula("fzf", true, true), formula("libyaml", true, false)]);
        assert_eq!(engine.apply(next.clone()).count(), 2);

        // 切换策略后基线按新策略重新计算
        engine.set_policy(InclusionPolicy::new(false));
        let decision = engine.apply(next);
        assert!(matches!(decision, ChangeDecision::BecameOutdated { count: 1, .. }));

        let decision = engine.apply(Snapshot::new(vec![
            formula("fzf", true, true),
            formula("libyaml", true, false),
        ]));
        assert!(matches!(decision, ChangeDecision::StillOutdated { count: 1, .. }));
    }
}
