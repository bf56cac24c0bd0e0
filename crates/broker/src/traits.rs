use crate::gateway::BrokerError;

/// Wire payloads that convert into domain models.
pub trait RemoteResponse<T> {
    fn to_model(&self) -> Result<T, BrokerError>;
}
