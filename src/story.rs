//! Top-level loader: turns compiled story bytes into runnable [`Runner`]s.
//!
//! [`Story`] owns the read-only, `Arc`-shared [`Image`] a compiler produced;
//! [`StoryBuilder`] collects the per-runner configuration (resource limits,
//! an rng seed, bound external functions, variable observers) behind a
//! chained-setter surface before handing back a ready-to-drive [`Runner`],
//! mirroring the chained-setter shape [`Limits`] already uses for its own
//! construction-time bounds.

use std::sync::Arc;

use crate::bytecode::Image;
use crate::error::Result;
use crate::executioner::ExternalFn;
use crate::globals::Observer;
use crate::runner::{Limits, Runner};

/// A loaded, immutable story image, ready to spin up one or many runners
/// against. Cheap to clone: the underlying [`Image`] is reference-counted.
#[derive(Clone)]
pub struct Story {
    image: Arc<Image>,
}

impl Story {
    /// Parse a compiled story image from its binary representation. See
    /// [`Image::from_bytes`] for the byte format.
    ///
    /// ```no_run
    /// use inkrt::Story;
    ///
    /// let bytes = std::fs::read("story.inkb").unwrap();
    /// let story = Story::from_bytes(&bytes).unwrap();
    /// let mut runner = story.new_runner(Default::default());
    /// while runner.can_continue() {
    ///     println!("{}", runner.getline().unwrap().text);
    /// }
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            image: Arc::new(Image::from_bytes(bytes)?),
        })
    }

    /// Wrap an already-decoded [`Image`], e.g. one built directly by tests
    /// or a host embedding its own loader ahead of this crate.
    pub fn from_image(image: Arc<Image>) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    /// Build a runner with default configuration and no bound externals or
    /// observers — the common case for a host that configures nothing
    /// beyond resource limits.
    pub fn new_runner(&self, limits: Limits) -> Runner {
        Runner::new(self.image.clone(), limits)
    }

    /// Start a [`StoryBuilder`] for configuring externals, observers, an rng
    /// seed, or limits before building a runner.
    pub fn builder(&self) -> StoryBuilder {
        StoryBuilder::new(self.image.clone())
    }
}

/// Chained configuration surface for constructing a [`Runner`] against a
/// [`Story`]'s image: resource limits, a deterministic rng seed, external
/// function bindings, and variable observers, all applied once at
/// [`StoryBuilder::build`].
pub struct StoryBuilder {
    image: Arc<Image>,
    limits: Limits,
    rng_seed: u64,
    externals: Vec<(String, ExternalFn, bool)>,
    observers: Vec<(String, Observer)>,
}

impl StoryBuilder {
    fn new(image: Arc<Image>) -> Self {
        Self {
            image,
            limits: Limits::new(),
            rng_seed: 0,
            externals: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Seed the deterministic pseudo-randomness behind
    /// `Sequence{shuffle:true}` and `ListOp::Random`, for reproducible
    /// playthroughs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Bind a host function callable from the story by name.
    /// `lookahead_safe` functions may run during speculative choice-text
    /// lookahead; others are skipped there, substituting `Value::None`.
    ///
    /// ```no_run
    /// use inkrt::{Story, Value};
    /// use std::sync::Arc;
    ///
    /// # let story = Story::from_image(Arc::new(inkrt::Image::new(vec![], vec![], vec![], vec![], 0)));
    /// let runner = story
    ///     .builder()
    ///     .with_external("dice_roll", Arc::new(|_args| Ok(Value::Int(4))), true)
    ///     .build();
    /// ```
    pub fn with_external(mut self, name: impl Into<String>, func: ExternalFn, lookahead_safe: bool) -> Self {
        self.externals.push((name.into(), func, lookahead_safe));
        self
    }

    /// Register a callback invoked whenever the named global variable is
    /// assigned.
    pub fn with_observer(mut self, name: impl Into<String>, observer: Observer) -> Self {
        self.observers.push((name.into(), observer));
        self
    }

    /// Construct the configured [`Runner`].
    pub fn build(self) -> Runner {
        let mut runner = Runner::seeded(self.image, self.limits, self.rng_seed);
        for (name, func, lookahead_safe) in self.externals {
            runner.bind_delegate(&name, func, lookahead_safe);
        }
        for (name, observer) in self.observers {
            runner.observe(&name, observer);
        }
        runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Command, ContainerMeta};
    use crate::value::Value;
    use std::sync::Mutex;

    fn hello_image() -> Arc<Image> {
        Arc::new(Image::new(
            vec![
                Command::LoadConst(0),
                Command::AppendToStream,
                Command::PushStreamMarker(Value::Newline),
            ],
            vec!["hello".to_string()],
            vec![ContainerMeta {
                name_hash: 1,
                entry_ip: 0,
                visits_tracked: false,
                turns_tracked: false,
            }],
            Vec::new(),
            0,
        ))
    }

    #[test]
    fn new_runner_runs_the_image() {
        let story = Story::from_image(hello_image());
        let mut runner = story.new_runner(Limits::new());
        let line = runner.getline().unwrap();
        assert_eq!(line.text, "hello");
    }

    #[test]
    fn builder_wires_externals_and_observers() {
        let story = Story::from_image(hello_image());
        let calls: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut runner = story
            .builder()
            .with_seed(7)
            .with_external(
                "bump",
                Arc::new(move |_args| {
                    *calls_clone.lock().unwrap() += 1;
                    Ok(Value::Int(1))
                }),
                true,
            )
            .with_observer(
                "score",
                Arc::new(move |new, _old| seen_clone.lock().unwrap().push(new.clone())),
            )
            .build();

        runner.set_var("score", Value::Int(5));
        assert_eq!(*seen.lock().unwrap(), vec![Value::Int(5)]);
        assert_eq!(runner.executioner().call_external(crate::executioner::name_hash("bump"), &[]).unwrap(), Value::Int(1));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn from_bytes_rejects_a_malformed_image() {
        let err = Story::from_bytes(&[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, crate::error::Error::Format(_)));
    }
}
