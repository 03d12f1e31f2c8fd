//! Panic recovery.
//!
//! This interceptor is outermost in the application chain. A panic anywhere
//! downstream is caught at the await point and turned into an
//! [`InternalOnlyLog`](gatehouse_core::ErrorKind::InternalOnlyLog) error that
//! carries the panic payload and the backtrace of the panicking thread. The
//! error-translation stage later logs it and hides the details from the client.
//!
//! ```text
//! [Panics] → Errors → Logger → Csrf → ... → Handler
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::FutureExt;
use gatehouse_core::{AppError, Reply, RequestContext};

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::Request;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Installs a process-wide hook that records the backtrace of each panic
/// for the thread it happened on, then defers to the previous hook.
fn install_backtrace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .map_or_else(|| "<unavailable>".to_string(), |trace| trace.to_string())
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Catches panics from the rest of the chain.
#[derive(Debug, Clone, Copy)]
pub struct PanicsMiddleware;

impl PanicsMiddleware {
    /// Creates the interceptor and installs the backtrace hook.
    #[must_use]
    pub fn new() -> Self {
        install_backtrace_hook();
        Self
    }
}

impl Default for PanicsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for PanicsMiddleware {
    fn name(&self) -> &'static str {
        "panics"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            let downstream = async move { next.run(ctx, request).await };
            match AssertUnwindSafe(downstream).catch_unwind().await {
                Ok(reply) => reply,
                Err(payload) => {
                    let trace = take_backtrace();
                    AppError::internal_only_log(format!(
                        "PANIC [{}] TRACE[{trace}]",
                        payload_message(&*payload)
                    ))
                    .into()
                }
            }
        })
    }
}
