/// What a component did with a key press.
///
/// Components return this to their view; `NotHandled` lets the view fall
/// through to its own bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the view to do
  Handled,
  /// Consumed, and the view has to react to `T`
  Event(T),
  /// Not consumed
  NotHandled,
}
