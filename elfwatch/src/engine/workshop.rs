// elfwatch/src/engine/workshop.rs
//
// Fleet-wide rollup: profile every elf in behavior data on the plain path
// and count HIGH labels. The workshop is COMPROMISED when strictly more than
// 10% of elves are HIGH.

use tracing::debug;

use crate::engine::profile;
use crate::loader::Tables;
use crate::records::{RiskTier, WorkshopState, WorkshopSummary};

const COMPROMISED_RATIO: f64 = 0.1;

pub fn workshop_summary(tables: &Tables) -> WorkshopSummary {
    let names = tables.elf_names();
    let total = names.len();

    let high = names.iter()
        .filter(|name| profile::analyze(tables, name).tier() == Some(RiskTier::High))
        .count();

    let average_suspicious_score =
        profile::mean_present(tables.behavior.iter().map(|r| r.suspicious_score));

    let status = if total > 0 && high as f64 / total as f64 > COMPROMISED_RATIO {
        WorkshopState::Compromised
    } else {
        WorkshopState::Stable
    };

    debug!("Workshop rollup: {} elves, {} high, status={}", total, high, status);

    WorkshopSummary {
        total_elves:     total,
        high_risk_count: high,
        average_suspicious_score,
        status,
    }
}
