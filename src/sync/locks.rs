use crate::model::Collection;
use tokio::sync::{Mutex, MutexGuard};

/// One async lock per cached collection. Whoever changes a collection in more than one step
/// (refresh a list, record a pending write, swap a replayed entry) holds its lock meanwhile, so
/// those steps never interleave across tasks.
#[derive(Debug, Default)]
pub(crate) struct CollectionLocks {
    categories: Mutex<()>,
    expenses: Mutex<()>,
}

impl CollectionLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        match collection {
            Collection::Categories => self.categories.lock().await,
            Collection::Expenses => self.expenses.lock().await,
        }
    }
}
