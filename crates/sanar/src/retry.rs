//! Resolution with one healing retry.
//!
//! An operation runs against the original locator. If it fails with a
//! selector-resolution error, the engine looks for a replacement; a usable
//! replacement is validated against the document and the operation runs
//! once more with it. Any other error passes through untouched.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::HealingMode;
use crate::context::{HealingContext, HealingResult};
use crate::document::{ElementHandle, HealingDocument};
use crate::engine::{HealingEngine, HealingHandle};
use crate::event::{EventSink, LocatorHealedEvent};
use crate::locator::Locator;
use crate::result::{ClassifyFailure, ResolveError};

/// Successful outcome of a guarded operation
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// The original locator worked
    Original(T),
    /// A healed locator worked
    Healed {
        /// Operation output
        value: T,
        /// Locator that worked
        locator: Locator,
        /// Element the healed locator resolved to
        element: ElementHandle,
        /// The healing attempt
        result: HealingResult,
    },
}

impl<T> Resolution<T> {
    /// Operation output
    #[must_use]
    pub const fn value(&self) -> &T {
        match self {
            Self::Original(value) | Self::Healed { value, .. } => value,
        }
    }

    /// Consume into the operation output
    #[must_use]
    pub fn into_value(self) -> T {
        match self {
            Self::Original(value) | Self::Healed { value, .. } => value,
        }
    }

    /// Whether healing was needed
    #[must_use]
    pub const fn is_healed(&self) -> bool {
        matches!(self, Self::Healed { .. })
    }

    /// Healed locator, if any
    #[must_use]
    pub const fn healed_locator(&self) -> Option<&Locator> {
        match self {
            Self::Original(_) => None,
            Self::Healed { locator, .. } => Some(locator),
        }
    }
}

/// The original error, with the healing attempt when one was made
#[derive(Debug, Clone, PartialEq)]
pub struct HealingFailure<E> {
    /// Error from the original locator
    pub error: E,
    /// Healing attempt, absent when the error was not healable
    pub diagnostics: Option<HealingResult>,
}

impl<E> HealingFailure<E> {
    const fn passthrough(error: E) -> Self {
        Self {
            error,
            diagnostics: None,
        }
    }

    /// Discard diagnostics
    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for HealingFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(d) = &self.diagnostics {
            match (d.reason, d.top()) {
                (Some(reason), Some(top)) => write!(
                    f,
                    " (healing: {reason}, best candidate {} scored {:.1})",
                    top.candidate.locator, top.score
                )?,
                (Some(reason), None) => write!(f, " (healing: {reason})")?,
                (None, _) => write!(f, " (healed locator failed validation)")?,
            }
        }
        Ok(())
    }
}

impl<E: Error + 'static> Error for HealingFailure<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs operations with healing against one document
pub struct HealingResolver<'a> {
    engine: Arc<HealingEngine>,
    document: &'a dyn HealingDocument,
    sink: Option<Arc<dyn EventSink>>,
}

impl fmt::Debug for HealingResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealingResolver")
            .field("engine", &self.engine)
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> HealingResolver<'a> {
    /// Create a resolver
    #[must_use]
    pub fn new(engine: Arc<HealingEngine>, document: &'a dyn HealingDocument) -> Self {
        Self {
            engine,
            document,
            sink: None,
        }
    }

    /// Create a resolver over the handle's current engine
    #[must_use]
    pub fn from_handle(handle: &HealingHandle, document: &'a dyn HealingDocument) -> Self {
        Self::new(handle.engine(), document)
    }

    /// Record `locator-healed` events
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve the context's locator to one element
    pub async fn resolve_element(
        &self,
        ctx: &HealingContext,
    ) -> Result<Resolution<ElementHandle>, HealingFailure<ResolveError>> {
        let document = self.document;
        self.resolve_with_healing(ctx, move |locator| async move {
            document.resolve(&locator).await
        })
        .await
    }

    /// Run `op` with the original locator, healing once on selector failure
    pub async fn resolve_with_healing<T, E, F, Fut>(
        &self,
        ctx: &HealingContext,
        op: F,
    ) -> Result<Resolution<T>, HealingFailure<E>>
    where
        F: Fn(Locator) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyFailure,
    {
        let error = match op(ctx.original.clone()).await {
            Ok(value) => return Ok(Resolution::Original(value)),
            Err(error) => error,
        };
        let Some(kind) = error.selector_failure() else {
            return Err(HealingFailure::passthrough(error));
        };
        tracing::debug!(locator = %ctx.original, %kind, "selector failed, attempting to heal");

        let result = self.engine.attempt_healing(ctx, self.document).await;
        let Some(locator) = usable_locator(&result) else {
            return Err(HealingFailure {
                error,
                diagnostics: Some(result),
            });
        };

        let element = match self.document.resolve(&locator).await {
            Ok(element) => element,
            Err(e) => {
                tracing::warn!(healed = %locator, error = %e, "healed locator failed validation");
                return Err(HealingFailure {
                    error,
                    diagnostics: Some(result),
                });
            }
        };

        match op(locator.clone()).await {
            Ok(value) => {
                self.record(ctx, &result);
                Ok(Resolution::Healed {
                    value,
                    locator,
                    element,
                    result,
                })
            }
            Err(e) => {
                tracing::warn!(healed = %locator, error = %e, "operation failed with healed locator");
                Err(HealingFailure {
                    error,
                    diagnostics: Some(result),
                })
            }
        }
    }

    fn record(&self, ctx: &HealingContext, result: &HealingResult) {
        let (Some(sink), Some(top)) = (&self.sink, result.top()) else {
            return;
        };
        let mode: HealingMode = self.engine.config().mode;
        sink.emit(&LocatorHealedEvent::new(ctx, result, top, mode));
    }
}

/// Locator the run may use: auto-applied, or the top assisted suggestion
fn usable_locator(result: &HealingResult) -> Option<Locator> {
    if let Some(applied) = &result.applied_locator {
        return Some(applied.clone());
    }
    if result.success {
        return result.top().map(|t| t.candidate.locator.clone());
    }
    None
}
