//! Lazily constructed, injected model capabilities.
//!
//! Each capability is built at most once, on first use. A failed or
//! panicking build is logged once and the capability stays absent for the
//! life of the pipeline.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use super::entity::RegexEntityExtractor;
use super::types::{EntityExtractor, SimilarityModel};
use super::StructuringError;

type Loader<T> = Box<dyn Fn() -> Result<Arc<T>, StructuringError> + Send + Sync>;

pub struct LazyCapability<T: ?Sized> {
    name: &'static str,
    cell: OnceLock<Option<Arc<T>>>,
    loader: Option<Loader<T>>,
}

impl<T: ?Sized> LazyCapability<T> {
    /// Built by `loader` on first `get`.
    pub fn lazy<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, StructuringError> + Send + Sync + 'static,
    {
        Self {
            name,
            cell: OnceLock::new(),
            loader: Some(Box::new(loader)),
        }
    }

    /// Already constructed.
    pub fn ready(name: &'static str, value: Arc<T>) -> Self {
        Self {
            name,
            cell: OnceLock::from(Some(value)),
            loader: None,
        }
    }

    /// Not configured.
    pub fn absent(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceLock::from(None),
            loader: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The capability, constructing it on first call.
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell
            .get_or_init(|| {
                let loader = self.loader.as_ref()?;
                match panic::catch_unwind(AssertUnwindSafe(|| loader())) {
                    Ok(Ok(value)) => {
                        tracing::info!(capability = self.name, "Capability initialized");
                        Some(value)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            capability = self.name,
                            error = %e,
                            "Capability failed to initialize; disabled for this process"
                        );
                        None
                    }
                    Err(payload) => {
                        tracing::warn!(
                            capability = self.name,
                            panic = panic_message(payload.as_ref()),
                            "Capability loader panicked; disabled for this process"
                        );
                        None
                    }
                }
            })
            .clone()
    }

    /// True once the capability has been constructed successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Some(_)))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Optional models the local strategies draw on.
pub struct Capabilities {
    pub similarity: LazyCapability<dyn SimilarityModel>,
    pub entities: LazyCapability<dyn EntityExtractor>,
}

impl Capabilities {
    pub fn new(
        similarity: LazyCapability<dyn SimilarityModel>,
        entities: LazyCapability<dyn EntityExtractor>,
    ) -> Self {
        Self {
            similarity,
            entities,
        }
    }

    /// No similarity model; regex entity recognizer.
    pub fn regex_only() -> Self {
        Self::new(
            LazyCapability::absent("similarity"),
            LazyCapability::ready("entities", Arc::new(RegexEntityExtractor::new()) as Arc<dyn EntityExtractor>),
        )
    }

    /// Neither capability: only pattern strategies produce candidates.
    pub fn none() -> Self {
        Self::new(
            LazyCapability::absent("similarity"),
            LazyCapability::absent("entities"),
        )
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::regex_only()
    }
}
