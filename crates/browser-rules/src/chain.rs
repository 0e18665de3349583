//! Ordered composition of lifecycle decorators around a test body.
//!
//! Decorators are registered outermost first. For `[A, B, C]` wrapping a
//! body `T`, a failing invocation observes:
//!
//! ```text
//! A.on_start  B.on_start  C.on_start        outer -> inner
//! acquire driver
//! T
//! C.on_failure  B.on_failure  A.on_failure  inner -> outer
//! C.on_finish   B.on_finish   A.on_finish   inner -> outer
//! release driver                            always
//! ```
//!
//! The driver is released last so that failure hooks can still capture
//! screenshots and page sources from it.
//!
//! # Hook errors
//!
//! A hook error never hides the test outcome. Errors raised while the test
//! is failing or skipped are only logged; when the body passed, the first
//! hook error becomes the outcome. A panicking hook counts as a hook error,
//! so the driver is still released.

use std::fmt;

use tracing::{debug, warn};

use crate::description::TestDescription;
use crate::driver::{DriverFactory, DriverResource};
use crate::error::RuleError;
use crate::failure::{Failure, catch_panic};

/// Lifecycle state of one test invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestState {
    /// Nothing ran yet.
    NotStarted,
    /// An attempt is executing.
    Running,
    /// The test passed.
    Succeeded,
    /// The last attempt failed and another one will follow.
    FailedPendingRetry,
    /// The test failed for good.
    Failed,
    /// The test was skipped.
    Skipped,
}

impl TestState {
    /// Returns true for states no further attempt can leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestState::Succeeded | TestState::Failed | TestState::Skipped
        )
    }
}

/// What hooks and the test body can see of the running invocation.
pub struct TestContext<'a, D> {
    description: &'a TestDescription,
    attempt: u32,
    driver: Option<&'a D>,
}

impl<'a, D> TestContext<'a, D> {
    /// Creates a context for `attempt` (1-based) of `description`.
    #[must_use]
    pub fn new(description: &'a TestDescription, attempt: u32, driver: Option<&'a D>) -> Self {
        Self {
            description,
            attempt,
            driver,
        }
    }

    /// The test being run.
    #[must_use]
    pub fn description(&self) -> &'a TestDescription {
        self.description
    }

    /// 1-based execution index; greater than one for retries.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The driver of this invocation.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::DriverUninitialized`] when no driver has been
    /// acquired (during `on_start`, or when acquisition failed).
    pub fn driver(&self) -> Result<&'a D, RuleError> {
        self.driver.ok_or(RuleError::DriverUninitialized)
    }
}

impl<D> fmt::Debug for TestContext<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("description", &self.description.display_name())
            .field("attempt", &self.attempt)
            .field("has_driver", &self.driver.is_some())
            .finish()
    }
}

/// A cross-cutting behaviour hooked into the test lifecycle.
///
/// Every hook defaults to a no-op; implement only what you need.
pub trait Decorator<D>: Send + Sync {
    /// Name used in logs and hook error messages.
    fn name(&self) -> &str;

    /// Called before the driver is acquired, outer decorators first.
    fn on_start(&self, _ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the body passed, inner decorators first.
    fn on_success(&self, _ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the body skipped itself, inner decorators first.
    fn on_skipped(&self, _reason: &str, _ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the body failed, inner decorators first.
    fn on_failure(&self, _failure: &Failure, _ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the outcome hooks, inner decorators first.
    fn on_finish(&self, _ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        Ok(())
    }
}

type Hook<D> = Box<dyn Fn(&TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync>;
type SkipHook<D> = Box<dyn Fn(&str, &TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync>;
type FailureHook<D> =
    Box<dyn Fn(&Failure, &TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync>;

/// A decorator assembled from optional callbacks.
///
/// ```ignore
/// let hooks = Hooks::new("timer")
///     .on_start(|ctx| { println!("starting {}", ctx.description()); Ok(()) })
///     .on_finish(|_| Ok(()));
/// ```
pub struct Hooks<D> {
    name: String,
    on_start: Option<Hook<D>>,
    on_success: Option<Hook<D>>,
    on_skipped: Option<SkipHook<D>>,
    on_failure: Option<FailureHook<D>>,
    on_finish: Option<Hook<D>>,
}

impl<D> Hooks<D> {
    /// Creates a decorator with every slot empty.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_start: None,
            on_success: None,
            on_skipped: None,
            on_failure: None,
            on_finish: None,
        }
    }

    /// Sets the `on_start` callback.
    #[must_use]
    pub fn on_start(
        mut self,
        hook: impl Fn(&TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Sets the `on_success` callback.
    #[must_use]
    pub fn on_success(
        mut self,
        hook: impl Fn(&TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Sets the `on_skipped` callback.
    #[must_use]
    pub fn on_skipped(
        mut self,
        hook: impl Fn(&str, &TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_skipped = Some(Box::new(hook));
        self
    }

    /// Sets the `on_failure` callback.
    #[must_use]
    pub fn on_failure(
        mut self,
        hook: impl Fn(&Failure, &TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Sets the `on_finish` callback.
    #[must_use]
    pub fn on_finish(
        mut self,
        hook: impl Fn(&TestContext<'_, D>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }
}

impl<D> Decorator<D> for Hooks<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&self, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        self.on_start.as_ref().map_or(Ok(()), |hook| hook(ctx))
    }

    fn on_success(&self, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        self.on_success.as_ref().map_or(Ok(()), |hook| hook(ctx))
    }

    fn on_skipped(&self, reason: &str, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        self.on_skipped
            .as_ref()
            .map_or(Ok(()), |hook| hook(reason, ctx))
    }

    fn on_failure(&self, failure: &Failure, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        self.on_failure
            .as_ref()
            .map_or(Ok(()), |hook| hook(failure, ctx))
    }

    fn on_finish(&self, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        self.on_finish.as_ref().map_or(Ok(()), |hook| hook(ctx))
    }
}

/// Decorators in registration order, outermost first.
pub struct DecoratorChain<D> {
    decorators: Vec<Box<dyn Decorator<D>>>,
}

impl<D> Default for DecoratorChain<D> {
    fn default() -> Self {
        Self {
            decorators: Vec::new(),
        }
    }
}

impl<D> fmt::Debug for DecoratorChain<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decorators.iter().map(|d| d.name()))
            .finish()
    }
}

impl<D> DecoratorChain<D> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decorator inside the ones registered so far.
    #[must_use]
    pub fn around(mut self, decorator: impl Decorator<D> + 'static) -> Self {
        self.push(Box::new(decorator));
        self
    }

    /// Appends an already boxed decorator inside the ones registered so far.
    pub fn push(&mut self, decorator: Box<dyn Decorator<D>>) {
        self.decorators.push(decorator);
    }

    /// Names of the registered decorators, outermost first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decorators.iter().map(|d| d.name())
    }

    /// Number of registered decorators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    /// Returns true if no decorator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Runs one attempt of `body` without a driver.
    ///
    /// # Errors
    ///
    /// Returns the body's failure, or the first hook error when the body
    /// passed.
    pub fn run_once<B>(
        &self,
        description: &TestDescription,
        attempt: u32,
        body: B,
    ) -> Result<(), Failure>
    where
        B: FnOnce(&TestContext<'_, D>) -> Result<(), Failure>,
    {
        let ctx = TestContext::new(description, attempt, None);
        let started = match self.start(&ctx) {
            Ok(()) => self.decorators.len(),
            Err((started, failure)) => return self.complete(started, Err(failure), &ctx),
        };
        let result = invoke(body, &ctx);
        self.complete(started, result, &ctx)
    }

    /// Runs one attempt of `body`, acquiring a driver from `resource` after
    /// the start hooks and releasing it after every other hook.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Driver`] if the driver cannot be acquired, the
    /// body's failure, or the first hook error when the body passed.
    pub fn run_with_driver<F, B>(
        &self,
        description: &TestDescription,
        attempt: u32,
        resource: &mut DriverResource<F>,
        body: B,
    ) -> Result<(), Failure>
    where
        F: DriverFactory<Driver = D>,
        B: FnOnce(&TestContext<'_, D>) -> Result<(), Failure>,
    {
        let bare = TestContext::new(description, attempt, None);
        let started = match self.start(&bare) {
            Ok(()) => self.decorators.len(),
            Err((started, failure)) => return self.complete(started, Err(failure), &bare),
        };

        let outcome = match resource.acquire() {
            Ok(driver) => {
                let ctx = TestContext::new(description, attempt, Some(driver));
                let result = invoke(body, &ctx);
                self.complete(started, result, &ctx)
            }
            Err(err) => {
                warn!(test = %description, "could not acquire driver: {err}");
                self.complete(started, Err(Failure::Driver(err)), &bare)
            }
        };

        resource.release();
        outcome
    }

    /// Runs `on_start` outer to inner; on error returns how many decorators
    /// started successfully.
    fn start(&self, ctx: &TestContext<'_, D>) -> Result<(), (usize, Failure)> {
        for (index, decorator) in self.decorators.iter().enumerate() {
            if let Err(err) = guarded(|| decorator.on_start(ctx)) {
                warn!(
                    test = %ctx.description(),
                    decorator = decorator.name(),
                    "on_start failed: {err:#}"
                );
                let failure = Failure::Error(err)
                    .context(format!("on_start hook of '{}' failed", decorator.name()));
                return Err((index, failure));
            }
        }
        Ok(())
    }

    /// Runs the outcome and finish hooks of the first `started` decorators,
    /// inner to outer.
    fn complete(
        &self,
        started: usize,
        result: Result<(), Failure>,
        ctx: &TestContext<'_, D>,
    ) -> Result<(), Failure> {
        let active = &self.decorators[..started];
        let mut hook_failure = None;

        for decorator in active.iter().rev() {
            let (hook, outcome) = match &result {
                Ok(()) => ("on_success", guarded(|| decorator.on_success(ctx))),
                Err(Failure::Skipped { reason }) => {
                    ("on_skipped", guarded(|| decorator.on_skipped(reason, ctx)))
                }
                Err(failure) => ("on_failure", guarded(|| decorator.on_failure(failure, ctx))),
            };
            note_hook_error(ctx, decorator.name(), hook, outcome, &mut hook_failure);
        }

        for decorator in active.iter().rev() {
            let outcome = guarded(|| decorator.on_finish(ctx));
            note_hook_error(ctx, decorator.name(), "on_finish", outcome, &mut hook_failure);
        }

        match (result, hook_failure) {
            (Ok(()), Some(failure)) => Err(failure),
            (result, _) => result,
        }
    }
}

fn note_hook_error<D>(
    ctx: &TestContext<'_, D>,
    decorator: &str,
    hook: &str,
    outcome: anyhow::Result<()>,
    first: &mut Option<Failure>,
) {
    if let Err(err) = outcome {
        warn!(test = %ctx.description(), decorator, hook, "hook failed: {err:#}");
        if first.is_none() {
            *first = Some(Failure::Error(
                err.context(format!("{hook} hook of '{decorator}' failed")),
            ));
        }
    }
}

/// Runs the body, turning panics into assertion failures.
fn invoke<D, B>(body: B, ctx: &TestContext<'_, D>) -> Result<(), Failure>
where
    B: FnOnce(&TestContext<'_, D>) -> Result<(), Failure>,
{
    debug!(test = %ctx.description(), attempt = ctx.attempt(), "running test body");
    catch_panic(|| body(ctx)).and_then(|result| result)
}

/// Runs a hook, turning a panic into a hook error.
fn guarded(hook: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    catch_panic(hook).unwrap_or_else(|failure| match failure.location() {
        Some(location) => Err(anyhow::anyhow!("panicked at {location}: {failure}")),
        None => Err(anyhow::anyhow!("panicked: {failure}")),
    })
}
