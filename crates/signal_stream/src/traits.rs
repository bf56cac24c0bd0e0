use crate::remote::DecodeError;

/// Raw wire payloads that validate into domain values.
pub trait RemoteFrame<T> {
    fn to_validated(&self) -> Result<T, DecodeError>;
}
