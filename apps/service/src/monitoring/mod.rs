/// Monitoring engine module - probes endpoints and tracks their health
///
/// This module is responsible for:
/// - Issuing HTTP probes and classifying transport failures
/// - Deriving endpoint status from consecutive outcomes
/// - Opening and resolving incidents
pub mod checker;
pub mod engine;
pub mod state;
pub mod types;

pub use checker::{HttpClient, ProbeRequest, ProbeResponse, ReqwestClient, TransportError};
pub use engine::ProbeEngine;
pub use types::{EndpointStatus, ProbeObservation, ProbeTrigger};
