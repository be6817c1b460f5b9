use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Status;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Ledger, Probe }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Ledger => "ledger",
        Phase::Probe => "probe",
    }}
    fn span(&self) -> Span { match self {
        Phase::Ledger => info_span!("ledger"),
        Phase::Probe => info_span!("probe"),
    }}
}

impl OpMarker for Status {
    const NAME: &'static str = "status";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("status") }
}
