//! Decision Engine: walk an ordered rule list and pick the one next action.

use std::collections::HashSet;

use drip_core::EmailType;

use crate::context::OwnerContext;
use crate::rule::Rule;

/// Single step of the engine.
#[derive(Debug, PartialEq)]
pub enum Decision<'r, R> {
    Send(&'r R),
    /// Record as done without delivering, then keep going.
    Skip(&'r R),
    /// Paused, or every rule already handled.
    None,
}

/// Where a whole cycle for one owner ended up.
#[derive(Debug, PartialEq)]
pub enum Outcome<'r, R> {
    Send(&'r R),
    Paused(EmailType),
    Exhausted,
}

#[derive(Debug, PartialEq)]
pub struct Resolution<'r, R> {
    /// Skips in rule order. The caller records each one.
    pub skipped: Vec<EmailType>,
    pub outcome: Outcome<'r, R>,
}

enum Step<'r, R> {
    Send(&'r R),
    Skip(&'r R),
    Pause(&'r R),
    Exhausted,
}

fn step<'r, R: Rule>(
    rules: &'r [R],
    ctx: &OwnerContext,
    already_sent: &HashSet<EmailType>,
) -> Step<'r, R> {
    for rule in rules {
        if already_sent.contains(&rule.email_type()) {
            continue;
        }
        if rule.should_skip(ctx) {
            return Step::Skip(rule);
        }
        if rule.should_pause(ctx) {
            return Step::Pause(rule);
        }
        return Step::Send(rule);
    }
    Step::Exhausted
}

/// First unhandled rule decides: skip, pause (`None`) or send.
pub fn next_action<'r, R: Rule>(
    rules: &'r [R],
    ctx: &OwnerContext,
    already_sent: &HashSet<EmailType>,
) -> Decision<'r, R> {
    match step(rules, ctx, already_sent) {
        Step::Send(rule) => Decision::Send(rule),
        Step::Skip(rule) => Decision::Skip(rule),
        Step::Pause(_) | Step::Exhausted => Decision::None,
    }
}

/// Run [`next_action`] to a fixed point for one cycle.
///
/// Skips are folded into a local copy of `already_sent` so evaluation
/// continues with the next rule; a pause or a send ends the cycle.
pub fn resolve<'r, R: Rule>(
    rules: &'r [R],
    ctx: &OwnerContext,
    already_sent: &HashSet<EmailType>,
) -> Resolution<'r, R> {
    let mut handled = already_sent.clone();
    let mut skipped = Vec::new();

    loop {
        let outcome = match step(rules, ctx, &handled) {
            Step::Skip(rule) => {
                let email_type = rule.email_type();
                handled.insert(email_type);
                skipped.push(email_type);
                continue;
            }
            Step::Send(rule) => Outcome::Send(rule),
            Step::Pause(rule) => Outcome::Paused(rule.email_type()),
            Step::Exhausted => Outcome::Exhausted,
        };
        return Resolution { skipped, outcome };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use drip_core::config::CampaignsConfig;
    use drip_core::CampaignKind;

    use crate::campaigns::rules_for;

    #[derive(Debug, PartialEq)]
    struct FakeRule {
        email_type: EmailType,
        skip: bool,
        pause: bool,
    }

    impl Rule for FakeRule {
        fn email_type(&self) -> EmailType {
            self.email_type
        }
        fn should_skip(&self, _: &OwnerContext) -> bool {
            self.skip
        }
        fn should_pause(&self, _: &OwnerContext) -> bool {
            self.pause
        }
    }

    fn rule(email_type: EmailType, skip: bool, pause: bool) -> FakeRule {
        FakeRule {
            email_type,
            skip,
            pause,
        }
    }

    fn ctx() -> OwnerContext {
        OwnerContext::fresh(1, Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap())
    }

    #[test]
    fn only_the_first_sendable_rule_is_sent() {
        let rules = [
            rule(EmailType::Coverage50, false, false),
            rule(EmailType::Coverage80, false, false),
            rule(EmailType::Coverage90, false, false),
        ];
        assert_eq!(
            next_action(&rules, &ctx(), &HashSet::new()),
            Decision::Send(&rules[0])
        );
        let res = resolve(&rules, &ctx(), &HashSet::new());
        assert_eq!(res.outcome, Outcome::Send(&rules[0]));
        assert!(res.skipped.is_empty());
    }

    #[test]
    fn already_sent_rules_are_passed_over() {
        let rules = [
            rule(EmailType::Coverage50, false, false),
            rule(EmailType::Coverage80, false, false),
        ];
        let sent = HashSet::from([EmailType::Coverage50]);
        assert_eq!(next_action(&rules, &ctx(), &sent), Decision::Send(&rules[1]));
    }

    #[test]
    fn skip_is_returned_then_cycle_continues() {
        let rules = [
            rule(EmailType::SalvageCheckin, true, false),
            rule(EmailType::SalvageBenchmark, true, false),
            rule(EmailType::SalvageLastCall, false, false),
        ];
        assert_eq!(
            next_action(&rules, &ctx(), &HashSet::new()),
            Decision::Skip(&rules[0])
        );

        let res = resolve(&rules, &ctx(), &HashSet::new());
        assert_eq!(
            res.skipped,
            vec![EmailType::SalvageCheckin, EmailType::SalvageBenchmark]
        );
        assert_eq!(res.outcome, Outcome::Send(&rules[2]));
    }

    #[test]
    fn skipped_type_is_never_sent_later() {
        let skipping = [rule(EmailType::OnboardingTargetBranch, true, false)];
        let res = resolve(&skipping, &ctx(), &HashSet::new());
        assert_eq!(res.skipped, vec![EmailType::OnboardingTargetBranch]);

        // Context changed and the rule would now send, but the skip was recorded.
        let sending = [rule(EmailType::OnboardingTargetBranch, false, false)];
        let recorded: HashSet<_> = res.skipped.into_iter().collect();
        assert_eq!(next_action(&sending, &ctx(), &recorded), Decision::None);
        assert_eq!(resolve(&sending, &ctx(), &recorded).outcome, Outcome::Exhausted);
    }

    #[test]
    fn pause_halts_later_rules() {
        let rules = [
            rule(EmailType::OnboardingSetupPr, true, false),
            rule(EmailType::OnboardingMergeSetupPr, false, true),
            rule(EmailType::OnboardingCoverageCharts, false, false),
        ];
        let sent = HashSet::from([EmailType::OnboardingSetupPr]);
        assert_eq!(next_action(&rules, &ctx(), &sent), Decision::None);

        // The skip before the pause is still collected.
        let res = resolve(&rules, &ctx(), &HashSet::new());
        assert_eq!(res.skipped, vec![EmailType::OnboardingSetupPr]);
        assert_eq!(res.outcome, Outcome::Paused(EmailType::OnboardingMergeSetupPr));
    }

    #[test]
    fn empty_and_exhausted_rule_lists() {
        let none: [FakeRule; 0] = [];
        assert_eq!(next_action(&none, &ctx(), &HashSet::new()), Decision::None);
        assert_eq!(resolve(&none, &ctx(), &HashSet::new()).outcome, Outcome::Exhausted);
    }

    #[test]
    fn fresh_install_gets_setup_pr_email() {
        let rules = rules_for(CampaignKind::Onboarding, &CampaignsConfig::default());
        let ctx = ctx();
        assert_eq!(ctx.pr_count, 0);
        assert!(!ctx.has_owner_coverage);

        match next_action(&rules, &ctx, &HashSet::new()) {
            Decision::Send(rule) => assert_eq!(rule.email_type(), EmailType::OnboardingSetupPr),
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn merged_setup_pr_without_coverage_pauses_at_charts() {
        let rules = rules_for(CampaignKind::Onboarding, &CampaignsConfig::default());
        let mut ctx = ctx();
        ctx.has_setup_pr = true;
        ctx.has_setup_pr_merged = true;
        ctx.has_owner_coverage = false;

        let res = resolve(&rules, &ctx, &HashSet::new());
        assert_eq!(
            res.skipped,
            vec![EmailType::OnboardingSetupPr, EmailType::OnboardingMergeSetupPr]
        );
        assert_eq!(res.outcome, Outcome::Paused(EmailType::OnboardingCoverageCharts));
    }
}
