//! Continuously updated cache views.
//!
//! A view yields the current rows once, then a fresh snapshot after each
//! committed change of the watched table. A view built with a refresh hook
//! runs that hook once, before waiting for the next change, if its first
//! snapshot came back empty. The refresh commits through the same store so
//! its rows arrive as the next snapshot.

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use crate::cache::CacheError;

/// Stream of cache snapshots.
pub type CacheView<T> = BoxStream<'static, Result<Vec<T>, CacheError>>;

pub(crate) type LoadFn<T> =
    Box<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, CacheError>> + Send + Sync>;
pub(crate) type RefreshFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Initial,
    RefreshPending,
    Following,
}

struct ViewState<T> {
    changes: watch::Receiver<u64>,
    load: LoadFn<T>,
    refresh: Option<RefreshFn>,
    stage: Stage,
}

/// Build a view over `changes`, reading rows with `load`.
pub(crate) fn cache_view<T>(
    changes: watch::Receiver<u64>,
    load: LoadFn<T>,
    refresh: Option<RefreshFn>,
) -> CacheView<T>
where
    T: Send + 'static,
{
    let state = ViewState {
        changes,
        load,
        refresh,
        stage: Stage::Initial,
    };

    stream::unfold(state, |mut state| async move {
        match state.stage {
            Stage::Initial => {
                state.changes.borrow_and_update();
                let snapshot = (state.load)().await;
                let empty = matches!(&snapshot, Ok(rows) if rows.is_empty());
                state.stage = if empty && state.refresh.is_some() {
                    Stage::RefreshPending
                } else {
                    Stage::Following
                };
                Some((snapshot, state))
            }
            Stage::RefreshPending => {
                if let Some(refresh) = &state.refresh {
                    refresh().await;
                }
                state.stage = Stage::Following;
                next_snapshot(state).await
            }
            Stage::Following => next_snapshot(state).await,
        }
    })
    .boxed()
}

async fn next_snapshot<T>(
    mut state: ViewState<T>,
) -> Option<(Result<Vec<T>, CacheError>, ViewState<T>)> {
    // Sender gone means the store was dropped; end the view.
    state.changes.changed().await.ok()?;
    let snapshot = (state.load)().await;
    Some((snapshot, state))
}
