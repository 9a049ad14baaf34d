//! Outbound and inbound message pipelines.
//!
//! A pipeline is a left-to-right composition of [`Stage`]s. Each stage
//! consumes the output type of the one before it, so a chain that skips
//! or reorders a step does not type-check.

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;

use crate::error::SamlResult;

/// One step of a pipeline.
pub trait Stage<In>: Send + Sync {
    /// What the stage produces.
    type Out;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Applies the stage.
    ///
    /// # Errors
    ///
    /// Returns the stage's failure; later stages do not run.
    fn apply(&self, input: In) -> SamlResult<Self::Out>;

    /// Runs `next` on this stage's output.
    fn then<S>(self, next: S) -> Then<Self, S>
    where
        Self: Sized,
        S: Stage<Self::Out>,
    {
        Then { first: self, second: next }
    }
}

/// Two stages run in sequence.
#[derive(Debug, Clone, Copy)]
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<In, A, B> Stage<In> for Then<A, B>
where
    A: Stage<In>,
    B: Stage<A::Out>,
{
    type Out = B::Out;

    fn name(&self) -> &'static str {
        self.second.name()
    }

    fn apply(&self, input: In) -> SamlResult<Self::Out> {
        let intermediate = self.first.apply(input)?;
        tracing::debug!(stage = self.first.name(), "Pipeline stage complete");
        self.second.apply(intermediate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SamlError;

    struct Append(&'static str);

    impl Stage<String> for Append {
        type Out = String;

        fn name(&self) -> &'static str {
            self.0
        }

        fn apply(&self, input: String) -> SamlResult<String> {
            Ok(input + self.0)
        }
    }

    struct Fail;

    impl Stage<String> for Fail {
        type Out = String;

        fn name(&self) -> &'static str {
            "fail"
        }

        fn apply(&self, _: String) -> SamlResult<String> {
            Err(SamlError::MissingElement("stage".to_string()))
        }
    }

    #[test]
    fn stages_run_left_to_right() {
        let chain = Append("a").then(Append("b")).then(Append("c"));
        assert_eq!(chain.apply(String::new()).unwrap(), "abc");
        assert_eq!(chain.name(), "c");
    }

    #[test]
    fn failure_stops_the_chain() {
        let chain = Append("a").then(Fail).then(Append("c"));
        assert!(chain.apply(String::new()).is_err());
    }
}
