use chrono::Duration;
use drip_core::EmailType;

use crate::campaigns::{SIGNATURE, SITE_URL};
use crate::context::{ChurnKind, OwnerContext};
use crate::format::{format_pct, format_relative_time, greeting, plural};
use crate::rule::RenderedEmail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalvageStage {
    Checkin,
    Benchmark,
    LastCall,
}

impl SalvageStage {
    pub const ALL: [SalvageStage; 3] = [
        SalvageStage::Checkin,
        SalvageStage::Benchmark,
        SalvageStage::LastCall,
    ];
}

/// One re-engagement email plus the minimum gap since the previous email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalvageStep {
    pub stage: SalvageStage,
    pub spacing_days: i64,
}

/// How far the owner got before churning. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    MergedPrs,
    OpenPrsOnly,
    NoPrs,
}

impl Engagement {
    pub fn of(ctx: &OwnerContext) -> Self {
        if ctx.has_merged_pr() {
            Engagement::MergedPrs
        } else if ctx.has_prs() {
            Engagement::OpenPrsOnly
        } else {
            Engagement::NoPrs
        }
    }
}

pub fn is_eligible(ctx: &OwnerContext) -> bool {
    ctx.churn != ChurnKind::Active
}

impl SalvageStep {
    pub fn email_type(&self) -> EmailType {
        match self.stage {
            SalvageStage::Checkin => EmailType::SalvageCheckin,
            SalvageStage::Benchmark => EmailType::SalvageBenchmark,
            SalvageStage::LastCall => EmailType::SalvageLastCall,
        }
    }

    pub fn should_skip(&self, ctx: &OwnerContext) -> bool {
        if ctx.churn == ChurnKind::Active {
            return true;
        }
        match self.stage {
            SalvageStage::Benchmark => {
                ctx.coverage_benchmark.is_none() || ctx.owner_coverage_pct.is_none()
            }
            SalvageStage::Checkin | SalvageStage::LastCall => false,
        }
    }

    /// Any email in the last `spacing_days`, from this campaign or another,
    /// holds the next salvage step back.
    pub fn should_pause(&self, ctx: &OwnerContext) -> bool {
        ctx.last_email_sent_at
            .is_some_and(|sent| ctx.as_of - sent < Duration::days(self.spacing_days))
    }

    pub fn render(&self, first_name: Option<&str>, ctx: &OwnerContext) -> RenderedEmail {
        let hi = greeting(first_name);
        let owner = &ctx.owner_name;
        let tenure = format_relative_time(Some(ctx.installed_at), ctx.as_of);

        let (subject, body) = match self.stage {
            SalvageStage::Checkin => checkin(&hi, owner, &tenure, ctx),
            SalvageStage::Benchmark => {
                let comparison = match (ctx.owner_coverage_pct, &ctx.coverage_benchmark) {
                    (Some(pct), Some(bench)) => format!(
                        "{owner} sits at {} line coverage. A team with a codebase of similar \
                         size ({} lines) is at {}.",
                        format_pct(pct),
                        bench.lines_total,
                        format_pct(bench.coverage_pct)
                    ),
                    _ => format!("Teams of a similar size to {owner} keep climbing with GitAuto."),
                };
                (
                    format!("How {owner}'s test coverage compares"),
                    format!(
                        "{hi}\n\n\
                         {comparison}\n\n\
                         Most of that gap is the kind of test GitAuto writes on its own. \
                         Pick things back up any time: {SITE_URL}/dashboard/coverage\n\n\
                         {SIGNATURE}"
                    ),
                )
            }
            SalvageStage::LastCall => (
                format!("Should we close the loop on {owner}?"),
                format!(
                    "{hi}\n\n\
                     This is the last note we'll send about {owner}. If GitAuto wasn't the \
                     right fit, a one-line reply on what was missing helps us more than \
                     anything.\n\n\
                     If timing was the problem, everything is still here: {SITE_URL}\n\n\
                     {SIGNATURE}"
                ),
            ),
        };
        RenderedEmail { subject, body }
    }
}

fn checkin(hi: &str, owner: &str, tenure: &str, ctx: &OwnerContext) -> (String, String) {
    let situation = match ctx.churn {
        ChurnKind::Uninstalled => format!("GitAuto was removed from {owner}"),
        ChurnKind::Downgraded => format!("the GitAuto plan on {owner} was canceled"),
        ChurnKind::Dormant | ChurnKind::Active => {
            format!("things have been quiet on {owner} lately")
        }
    };
    let history = match Engagement::of(ctx) {
        Engagement::MergedPrs => format!(
            "Your team merged {} GitAuto test {}, so the tests were landing.",
            ctx.merged_pr_count,
            plural(ctx.merged_pr_count, "PR", "PRs")
        ),
        Engagement::OpenPrsOnly => format!(
            "GitAuto opened {} test {} that never got merged. If they missed the mark, \
             we'd like to know why.",
            ctx.pr_count,
            plural(ctx.pr_count, "PR", "PRs")
        ),
        Engagement::NoPrs => "It looks like GitAuto never got as far as opening a test PR, \
                              which usually means setup got stuck."
            .to_string(),
    };
    (
        format!("Checking in on {owner}"),
        format!(
            "{hi}\n\n\
             You set up GitAuto {tenure}, and I noticed {situation}. {history}\n\n\
             Was something missing? Just reply to this email; it comes straight to us.\n\n\
             {SIGNATURE}"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CoverageBenchmark;
    use chrono::{TimeZone, Utc};

    fn step(stage: SalvageStage) -> SalvageStep {
        SalvageStep {
            stage,
            spacing_days: 7,
        }
    }

    fn churned(kind: ChurnKind) -> OwnerContext {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).unwrap();
        let mut ctx = OwnerContext::fresh(1, now);
        ctx.installed_at = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        ctx.churn = kind;
        ctx
    }

    #[test]
    fn active_owners_skip_everything() {
        let ctx = churned(ChurnKind::Active);
        for stage in SalvageStage::ALL {
            assert!(step(stage).should_skip(&ctx));
        }
    }

    #[test]
    fn benchmark_needs_both_numbers() {
        let mut ctx = churned(ChurnKind::Dormant);
        assert!(step(SalvageStage::Benchmark).should_skip(&ctx));
        ctx.owner_coverage_pct = Some(30.0);
        ctx.coverage_benchmark = Some(CoverageBenchmark {
            lines_total: 1200,
            coverage_pct: 71.0,
        });
        assert!(!step(SalvageStage::Benchmark).should_skip(&ctx));

        let email = step(SalvageStage::Benchmark).render(Some("Ada"), &ctx);
        assert!(email.body.contains("30% line coverage"));
        assert!(email.body.contains("(1200 lines) is at 71%"));
    }

    #[test]
    fn every_step_respects_spacing() {
        let mut ctx = churned(ChurnKind::Uninstalled);
        for stage in SalvageStage::ALL {
            assert!(!step(stage).should_pause(&ctx));
        }

        // An onboarding email minutes ago holds the check-in back too.
        ctx.last_email_sent_at = Some(ctx.as_of - Duration::minutes(5));
        assert!(step(SalvageStage::Checkin).should_pause(&ctx));

        ctx.last_email_sent_at = Some(ctx.as_of - Duration::days(3));
        for stage in SalvageStage::ALL {
            assert!(step(stage).should_pause(&ctx));
        }

        ctx.last_email_sent_at = Some(ctx.as_of - Duration::days(7));
        for stage in SalvageStage::ALL {
            assert!(!step(stage).should_pause(&ctx));
        }
    }

    #[test]
    fn engagement_priority() {
        let mut ctx = churned(ChurnKind::Dormant);
        assert_eq!(Engagement::of(&ctx), Engagement::NoPrs);
        ctx.pr_count = 2;
        assert_eq!(Engagement::of(&ctx), Engagement::OpenPrsOnly);
        ctx.merged_pr_count = 1;
        assert_eq!(Engagement::of(&ctx), Engagement::MergedPrs);
    }

    #[test]
    fn checkin_uses_tenure_and_churn_reason() {
        let mut ctx = churned(ChurnKind::Downgraded);
        ctx.pr_count = 3;
        ctx.merged_pr_count = 3;
        let email = step(SalvageStage::Checkin).render(None, &ctx);
        assert!(email.body.starts_with("Hi there,"));
        assert!(email.body.contains("You set up GitAuto back in Jan"));
        assert!(email.body.contains("plan on org-1 was canceled"));
        assert!(email.body.contains("merged 3 GitAuto test PRs"));
    }
}
