//! Provisioning collaborator seam.
//!
//! The core never provisions anything itself. It hands a
//! [`TerraformOptions`] to a [`Provisioner`] and reads back an [`Outputs`]
//! bag. [`TerraformCli`] is the adapter that shells out to the `terraform`
//! binary.

mod options;
mod outputs;
mod terraform;

pub use options::TerraformOptions;
pub use outputs::Outputs;
pub use terraform::TerraformCli;

use crate::errors::ProvisioningError;
use async_trait::async_trait;

/// Black-box apply/destroy/output API of the infrastructure tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Initializes the working directory and applies the configuration.
    async fn init_and_apply(&self, options: &TerraformOptions)
        -> Result<Outputs, ProvisioningError>;

    /// Destroys everything the configuration created.
    async fn destroy(&self, options: &TerraformOptions) -> Result<(), ProvisioningError>;

    /// Reads the declared outputs of the last apply.
    async fn outputs(&self, options: &TerraformOptions) -> Result<Outputs, ProvisioningError>;
}
