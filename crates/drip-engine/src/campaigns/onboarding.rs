use drip_core::EmailType;

use crate::campaigns::{SIGNATURE, SITE_URL};
use crate::context::OwnerContext;
use crate::format::{greeting, plural};
use crate::rule::RenderedEmail;

/// Onboarding steps, in the order a new install should progress through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    SetupPr,
    MergeSetupPr,
    CoverageCharts,
    TargetBranch,
    ScheduleTriggers,
    MergeTestPr,
    PurchaseCredits,
}

pub fn is_eligible(ctx: &OwnerContext) -> bool {
    ctx.is_installed()
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 7] = [
        OnboardingStep::SetupPr,
        OnboardingStep::MergeSetupPr,
        OnboardingStep::CoverageCharts,
        OnboardingStep::TargetBranch,
        OnboardingStep::ScheduleTriggers,
        OnboardingStep::MergeTestPr,
        OnboardingStep::PurchaseCredits,
    ];

    pub fn email_type(&self) -> EmailType {
        match self {
            OnboardingStep::SetupPr => EmailType::OnboardingSetupPr,
            OnboardingStep::MergeSetupPr => EmailType::OnboardingMergeSetupPr,
            OnboardingStep::CoverageCharts => EmailType::OnboardingCoverageCharts,
            OnboardingStep::TargetBranch => EmailType::OnboardingTargetBranch,
            OnboardingStep::ScheduleTriggers => EmailType::OnboardingScheduleTriggers,
            OnboardingStep::MergeTestPr => EmailType::OnboardingMergeTestPr,
            OnboardingStep::PurchaseCredits => EmailType::OnboardingPurchaseCredits,
        }
    }

    pub fn should_skip(&self, ctx: &OwnerContext) -> bool {
        match self {
            OnboardingStep::SetupPr => ctx.has_setup_pr,
            OnboardingStep::MergeSetupPr => ctx.has_setup_pr_merged,
            OnboardingStep::CoverageCharts => false,
            OnboardingStep::TargetBranch => ctx.has_target_branch,
            OnboardingStep::ScheduleTriggers => {
                ctx.scheduled_repo_count > 0 && ctx.unscheduled_repo_names.is_empty()
            }
            OnboardingStep::MergeTestPr => ctx.has_merged_pr(),
            OnboardingStep::PurchaseCredits => {
                ctx.has_purchased_credits || ctx.has_active_subscription
            }
        }
    }

    pub fn should_pause(&self, ctx: &OwnerContext) -> bool {
        match self {
            OnboardingStep::SetupPr => false,
            OnboardingStep::MergeSetupPr => !ctx.has_setup_pr,
            OnboardingStep::CoverageCharts => !ctx.has_owner_coverage,
            OnboardingStep::TargetBranch | OnboardingStep::ScheduleTriggers => {
                ctx.total_repo_count == 0
            }
            OnboardingStep::MergeTestPr => ctx.open_test_prs.is_empty(),
            OnboardingStep::PurchaseCredits => !ctx.has_merged_pr(),
        }
    }

    pub fn render(
        &self,
        owner_name: &str,
        first_name: Option<&str>,
        ctx: &OwnerContext,
    ) -> RenderedEmail {
        let hi = greeting(first_name);
        let (subject, body) = match self {
            OnboardingStep::SetupPr => (
                format!("Get GitAuto running on {owner_name}"),
                format!(
                    "{hi}\n\n\
                     Thanks for installing GitAuto on {owner_name}. The first step is a small \
                     setup PR that adds coverage reporting to your CI, so we can see which \
                     files need tests.\n\n\
                     Create it from your dashboard: {SITE_URL}/dashboard/coverage\n\n\
                     {SIGNATURE}"
                ),
            ),
            OnboardingStep::MergeSetupPr => {
                let prs = ctx
                    .setup_prs
                    .iter()
                    .map(|pr| {
                        format!(
                            "- https://github.com/{owner_name}/{}/pull/{}",
                            pr.repo_name, pr.pr_number
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                (
                    "Your GitAuto setup PR is waiting".to_string(),
                    format!(
                        "{hi}\n\n\
                         Your setup {} ready for review:\n\n{prs}\n\n\
                         Once merged, coverage is collected on every CI run and GitAuto can \
                         start targeting the files that need tests most.\n\n\
                         {SIGNATURE}",
                        plural(ctx.setup_prs.len(), "PR is", "PRs are")
                    ),
                )
            }
            OnboardingStep::CoverageCharts => (
                format!("Coverage charts for {owner_name} are live"),
                format!(
                    "{hi}\n\n\
                     Coverage data is coming in for {} {}. Your charts show where \
                     {owner_name} stands today and how it moves as tests land.\n\n\
                     Take a look: {SITE_URL}/dashboard/charts\n\n\
                     {SIGNATURE}",
                    ctx.coverage_repo_count,
                    plural(ctx.coverage_repo_count, "repository", "repositories")
                ),
            ),
            OnboardingStep::TargetBranch => (
                "Point GitAuto at the right branch".to_string(),
                format!(
                    "{hi}\n\n\
                     GitAuto opens test PRs against each repository's default branch. If your \
                     team works off a branch like `develop` or `staging`, set it as the target \
                     branch so PRs land where you review code.\n\n\
                     Settings: {SITE_URL}/settings/rules\n\n\
                     {SIGNATURE}"
                ),
            ),
            OnboardingStep::ScheduleTriggers => {
                let repos = ctx
                    .unscheduled_repo_names
                    .iter()
                    .take(5)
                    .map(|r| format!("- {r}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                (
                    format!("Let GitAuto write tests for {owner_name} on a schedule"),
                    format!(
                        "{hi}\n\n\
                         With the schedule trigger on, GitAuto picks the least-covered files \
                         every weekday and opens test PRs for them, no manual work needed.\n\n\
                         Not scheduled yet:\n{repos}\n\n\
                         Turn it on: {SITE_URL}/dashboard/triggers\n\n\
                         {SIGNATURE}"
                    ),
                )
            }
            OnboardingStep::MergeTestPr => {
                let link = match ctx.open_test_prs.first() {
                    Some(pr) => format!(
                        "GitAuto opened a test PR for {}:\n\
                         https://github.com/{}/{}/pull/{}",
                        pr.repo_name, pr.owner_name, pr.repo_name, pr.pr_number
                    ),
                    None => format!(
                        "GitAuto's test PRs for {owner_name} are waiting for review:\n\
                         {SITE_URL}/dashboard/prs"
                    ),
                };
                (
                    "Your first GitAuto test PR is ready".to_string(),
                    format!(
                        "{hi}\n\n\
                         {link}\n\n\
                         Review it like any teammate's PR. Comment on it if something should \
                         change and GitAuto will update it.\n\n\
                         {SIGNATURE}"
                    ),
                )
            }
            OnboardingStep::PurchaseCredits => (
                format!("Keep tests coming for {owner_name}"),
                format!(
                    "{hi}\n\n\
                     You've merged {} GitAuto {} so far. Free credits run out quickly once the \
                     schedule is on; add credits or enable auto-reload to keep PRs coming.\n\n\
                     Credits: {SITE_URL}/dashboard/credits\n\n\
                     {SIGNATURE}",
                    ctx.merged_pr_count,
                    plural(ctx.merged_pr_count, "PR", "PRs")
                ),
            ),
        };
        RenderedEmail { subject, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OpenTestPr;
    use chrono::Utc;

    #[test]
    fn target_branch_waits_for_repositories() {
        let mut ctx = OwnerContext::fresh(1, Utc::now());
        assert!(OnboardingStep::TargetBranch.should_pause(&ctx));
        ctx.total_repo_count = 2;
        assert!(!OnboardingStep::TargetBranch.should_pause(&ctx));
        ctx.has_target_branch = true;
        assert!(OnboardingStep::TargetBranch.should_skip(&ctx));
    }

    #[test]
    fn schedule_triggers_skip_only_when_every_repo_scheduled() {
        let mut ctx = OwnerContext::fresh(1, Utc::now());
        ctx.total_repo_count = 2;
        ctx.scheduled_repo_count = 1;
        ctx.unscheduled_repo_names.insert("web".into());
        assert!(!OnboardingStep::ScheduleTriggers.should_skip(&ctx));

        ctx.unscheduled_repo_names.clear();
        ctx.scheduled_repo_count = 2;
        assert!(OnboardingStep::ScheduleTriggers.should_skip(&ctx));
    }

    #[test]
    fn purchase_credits_waits_for_a_merged_pr() {
        let mut ctx = OwnerContext::fresh(1, Utc::now());
        assert!(OnboardingStep::PurchaseCredits.should_pause(&ctx));
        ctx.merged_pr_count = 1;
        assert!(!OnboardingStep::PurchaseCredits.should_pause(&ctx));
        ctx.has_active_subscription = true;
        assert!(OnboardingStep::PurchaseCredits.should_skip(&ctx));
    }

    #[test]
    fn merge_test_pr_links_the_open_pr() {
        let mut ctx = OwnerContext::fresh(1, Utc::now());
        assert!(OnboardingStep::MergeTestPr.should_pause(&ctx));
        let fallback = OnboardingStep::MergeTestPr.render("acme", None, &ctx);
        assert!(fallback.body.contains("https://gitauto.ai/dashboard/prs"));

        ctx.open_test_prs.push(OpenTestPr {
            owner_name: "acme".into(),
            repo_name: "api".into(),
            pr_number: 17,
        });
        let email = OnboardingStep::MergeTestPr.render("acme", Some("Ada"), &ctx);
        assert!(email.body.starts_with("Hi Ada,"));
        assert!(email.body.contains("https://github.com/acme/api/pull/17"));
    }

    #[test]
    fn every_step_renders_for_a_fresh_owner() {
        let ctx = OwnerContext::fresh(1, Utc::now());
        for step in OnboardingStep::ALL {
            let email = step.render("acme", None, &ctx);
            assert!(!email.subject.is_empty(), "{step:?}");
            assert!(email.body.starts_with("Hi there,"), "{step:?}");
            assert!(email.body.contains(SIGNATURE), "{step:?}");
        }
    }
}
