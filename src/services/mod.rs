pub mod activation;

pub use activation::{
    Activation, ActivationError, ActivationRequest, ActivationService, IdentityCapabilities,
    ProvisioningSettings, UserSnapshot,
};
