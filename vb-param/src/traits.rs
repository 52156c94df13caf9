/// Anything that wants to hear about posterior updates of a
/// [`crate::BayesianParameter`]. Invoked synchronously after the new
/// posterior is in place, so reading the parameter from inside the
/// handler sees the updated value.
pub trait PosteriorObserver {
    fn on_posterior_changed(&self);
}

impl<F> PosteriorObserver for F
where
    F: Fn(),
{
    fn on_posterior_changed(&self) {
        self()
    }
}
