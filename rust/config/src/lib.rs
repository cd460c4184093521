pub mod registry;

use async_trait::async_trait;
use registry::Registry;
use trashcan_error::TrashcanError;

/// Constructs a value of `Self` from a (usually serde-deserialized) config
/// section. Implementations pull shared collaborators out of the `Registry`
/// rather than reaching for process-wide singletons.
#[async_trait]
pub trait Configurable<T, E = Box<dyn TrashcanError>> {
    async fn try_from_config(config: &T, registry: &Registry) -> Result<Self, E>
    where
        Self: Sized;
}
