//! Smoothing of noisy measurements.

pub mod ema;

/// A filter for values of type `V`.
///
/// Filters are stateless configuration objects; the accumulated history lives in a separate
/// [`Filter::State`] value, so one filter can be shared between several signals.
pub trait Filter<V> {
    /// Per-signal filter state.
    type State: Default;

    /// Adds a new value to the filter, returning the filtered value.
    fn filter(&self, state: &mut Self::State, value: V) -> V;
}
