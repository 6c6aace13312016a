//! Post-debate analytics, run once when the session reaches judgment.
//!
//! Each sub-analysis degrades independently: a failed section becomes an
//! omission in the final report, which is always produced.

pub mod chains;
pub mod consensus;
pub mod judgment;
pub mod report;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::session::Session;

pub use chains::{build_chains, ArgumentChain, ChainAnalysis};
pub use consensus::{
    build_consensus, CommonGround, ConsensusReport, Disagreement, DisagreementKind, ResolutionKind,
};
pub use judgment::{
    evaluate_judgment, BiasFinding, CognitiveBias, DimensionScore, Judgment, JudgmentDimension,
};
pub use report::{build_report, FinalReport};

/// Which analysis a caller wants from `getAnalytics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Chains,
    Consensus,
    Judgment,
    Report,
}

impl std::str::FromStr for AnalysisKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chains" => Ok(Self::Chains),
            "consensus" => Ok(Self::Consensus),
            "judgment" => Ok(Self::Judgment),
            "report" => Ok(Self::Report),
            other => Err(ApiError::InvalidConfig(format!(
                "unknown analysis kind: {other}"
            ))),
        }
    }
}

/// All analytics artefacts for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateAnalytics {
    pub chains: Option<ChainAnalysis>,
    pub consensus: Option<ConsensusReport>,
    pub judgment: Option<Judgment>,
    pub report: FinalReport,
}

/// Run the full analytics pass over a finished (or judged) session.
pub fn run_analytics(session: &Session) -> DebateAnalytics {
    let turns: Vec<_> = session.turns().cloned().collect();
    let mut omissions = Vec::new();

    let chains = match build_chains(&turns) {
        Ok(chains) => Some(chains),
        Err(reason) => {
            warn!(session_id = %session.id, %reason, "chain analysis omitted");
            omissions.push(format!("chains: {reason}"));
            None
        }
    };

    let consensus = match build_consensus(&turns) {
        Ok(consensus) => Some(consensus),
        Err(reason) => {
            warn!(session_id = %session.id, %reason, "consensus analysis omitted");
            omissions.push(format!("consensus: {reason}"));
            None
        }
    };

    let judgment = match evaluate_judgment(&turns, session.debater_count) {
        Ok(judgment) => Some(judgment),
        Err(reason) => {
            warn!(session_id = %session.id, %reason, "judgment analysis omitted");
            omissions.push(format!("judgment: {reason}"));
            None
        }
    };

    let report = build_report(
        session,
        chains.as_ref(),
        consensus.as_ref(),
        judgment.as_ref(),
        omissions,
    );

    DebateAnalytics {
        chains,
        consensus,
        judgment,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebateConfig;
    use crate::session::phase::Role;
    use std::collections::HashMap;

    #[test]
    fn test_empty_session_still_yields_report() {
        let session = Session::new(
            "topic",
            None,
            2,
            HashMap::from([(Role::Debater(0), "m".to_string())]),
            DebateConfig::default(),
        );
        let analytics = run_analytics(&session);
        assert!(analytics.chains.is_none());
        assert!(analytics.consensus.is_none());
        assert!(analytics.judgment.is_none());
        assert_eq!(analytics.report.omissions.len(), 3);
        assert!(!analytics.report.summary.is_empty());
    }

    #[test]
    fn test_analysis_kind_parsing() {
        assert_eq!("chains".parse::<AnalysisKind>().unwrap(), AnalysisKind::Chains);
        assert_eq!("report".parse::<AnalysisKind>().unwrap(), AnalysisKind::Report);
        assert!("vibes".parse::<AnalysisKind>().is_err());
    }
}
