/// A protocol state that advances one input at a time.
///
/// Anything a transition produces besides the next state (replies, envelope
/// updates, a request to close) is written into `Context`.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;
}
