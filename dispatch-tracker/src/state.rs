use crate::view::TrackerView;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

/// Vue live partagée entre la tâche de polling et l'API HTTP.
/// Le verrou n'est jamais tenu à travers un `.await`.
pub type SharedView = Shared<TrackerView>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

pub fn new_view() -> SharedView {
    new_state(TrackerView::new())
}
