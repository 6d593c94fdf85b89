use drip_core::EmailType;

use crate::campaigns::{SIGNATURE, SITE_URL};
use crate::context::OwnerContext;
use crate::format::{format_pct, greeting, plural};
use crate::rule::RenderedEmail;

/// Owner-wide line coverage milestones, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageMilestone {
    Fifty,
    Eighty,
    Ninety,
}

pub fn is_eligible(ctx: &OwnerContext) -> bool {
    ctx.is_installed()
}

impl CoverageMilestone {
    pub const ALL: [CoverageMilestone; 3] = [
        CoverageMilestone::Fifty,
        CoverageMilestone::Eighty,
        CoverageMilestone::Ninety,
    ];

    pub fn threshold(&self) -> f64 {
        match self {
            CoverageMilestone::Fifty => 50.0,
            CoverageMilestone::Eighty => 80.0,
            CoverageMilestone::Ninety => 90.0,
        }
    }

    pub fn next(&self) -> Option<CoverageMilestone> {
        match self {
            CoverageMilestone::Fifty => Some(CoverageMilestone::Eighty),
            CoverageMilestone::Eighty => Some(CoverageMilestone::Ninety),
            CoverageMilestone::Ninety => None,
        }
    }

    pub fn email_type(&self) -> EmailType {
        match self {
            CoverageMilestone::Fifty => EmailType::Coverage50,
            CoverageMilestone::Eighty => EmailType::Coverage80,
            CoverageMilestone::Ninety => EmailType::Coverage90,
        }
    }

    /// Coverage already passed the next milestone: only the highest reached
    /// milestone is congratulated.
    pub fn should_skip(&self, ctx: &OwnerContext) -> bool {
        match (ctx.owner_coverage_pct, self.next()) {
            (Some(pct), Some(next)) => pct >= next.threshold(),
            _ => false,
        }
    }

    pub fn should_pause(&self, ctx: &OwnerContext) -> bool {
        ctx.owner_coverage_pct.map_or(true, |pct| pct < self.threshold())
    }

    pub fn render(
        &self,
        owner_name: &str,
        pct: Option<f64>,
        coverage_repo_count: usize,
        repo_most_needing_coverage: Option<&str>,
    ) -> RenderedEmail {
        let milestone = format_pct(self.threshold());
        let standing = match pct {
            Some(pct) => format!("is now {}, past", format_pct(pct)),
            None => "has passed".to_string(),
        };
        let repos = format!(
            "{coverage_repo_count} {}",
            plural(coverage_repo_count, "repository", "repositories")
        );
        let next_target = match (self.next(), repo_most_needing_coverage) {
            (Some(next), Some(repo)) => format!(
                "Next stop: {}. {repo} has the most room to grow, so that's where \
                 GitAuto will focus.",
                format_pct(next.threshold())
            ),
            (Some(next), None) => format!("Next stop: {}.", format_pct(next.threshold())),
            (None, _) => "That puts you in rare company. Nice work.".to_string(),
        };

        RenderedEmail {
            subject: format!("{owner_name} just passed {milestone} test coverage"),
            body: format!(
                "{}\n\n\
                 Line coverage across {repos} on {owner_name} {standing} the \
                 {milestone} mark.\n\n\
                 {next_target}\n\n\
                 See the trend: {SITE_URL}/dashboard/charts\n\n\
                 {SIGNATURE}",
                greeting(None)
            ),
        }
    }
}
