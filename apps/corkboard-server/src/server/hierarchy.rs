//! Walks over the containment tree: board > list > card > task > subtask.

use std::collections::VecDeque;

use corkboard_core::{BoardId, CardId, Container, Item};

use super::{
    errors::ServiceError,
    store::{Repository, VersionKey},
};

/// Board the container ultimately hangs off.
pub(crate) async fn enclosing_board<R: Repository>(
    repo: &R,
    container: Container,
) -> Result<BoardId, ServiceError> {
    let mut current = container;
    loop {
        let item = match current {
            Container::Board(board) => return Ok(board),
            Container::List(id) => Item::List(id),
            Container::Card(id) => Item::Card(id),
            Container::Task(id) => Item::Task(id),
        };
        current = repo
            .locate(item)
            .await?
            .ok_or(ServiceError::NotFound)?
            .parent;
    }
}

pub(crate) async fn item_board<R: Repository>(repo: &R, item: Item) -> Result<BoardId, ServiceError> {
    let placement = repo.locate(item).await?.ok_or(ServiceError::NotFound)?;
    enclosing_board(repo, placement.parent).await
}

/// Card a card, task or subtask belongs to. Lists have no owning card.
pub(crate) async fn owning_card<R: Repository>(repo: &R, item: Item) -> Result<CardId, ServiceError> {
    let mut current = match item {
        Item::List(_) => return Err(ServiceError::InvalidRequest),
        Item::Card(card) => return Ok(card),
        Item::Task(_) | Item::SubTask(_) => item,
    };
    loop {
        let placement = repo.locate(current).await?.ok_or(ServiceError::NotFound)?;
        match placement.parent {
            Container::Card(card) => return Ok(card),
            Container::Task(task) => current = Item::Task(task),
            Container::Board(_) | Container::List(_) => return Err(ServiceError::Internal),
        }
    }
}

pub(crate) async fn container_card<R: Repository>(
    repo: &R,
    container: Container,
) -> Result<Option<CardId>, ServiceError> {
    match container {
        Container::Board(_) | Container::List(_) => Ok(None),
        Container::Card(card) => Ok(Some(card)),
        Container::Task(task) => owning_card(repo, Item::Task(task)).await.map(Some),
    }
}

/// An item with every descendant, archived ones included.
#[derive(Debug, Default)]
pub(crate) struct Subtree {
    /// Breadth first, root at index 0.
    pub(crate) items: Vec<Item>,
    /// Children version of every container in the subtree, read before its
    /// children were listed.
    pub(crate) versions: Vec<(VersionKey, u64)>,
}

pub(crate) async fn collect_subtree<R: Repository>(
    repo: &R,
    root: Item,
) -> Result<Subtree, ServiceError> {
    let mut subtree = Subtree::default();
    let mut queue = VecDeque::from([root]);
    while let Some(item) = queue.pop_front() {
        subtree.items.push(item);
        let Some(container) = item.as_container() else {
            continue;
        };
        let key = VersionKey::Children(container);
        let version = repo.version(key).await?.ok_or(ServiceError::NotFound)?;
        subtree.versions.push((key, version));
        queue.extend(repo.children(container).await?);
    }
    Ok(subtree)
}

#[cfg(test)]
mod tests {
    use corkboard_core::{Container, Item, ListId};

    use super::{collect_subtree, enclosing_board, item_board, owning_card};
    use crate::server::{errors::ServiceError, test_support::Fixture};

    #[tokio::test]
    async fn walks_up_from_any_level() {
        let fixture = Fixture::new().await;
        let list = fixture.list().await;
        let card = fixture.child(list).await;
        let task = fixture.child(card).await;
        let subtask = fixture.child(task).await;

        assert_eq!(item_board(&fixture.store, subtask).await.unwrap(), fixture.board);
        let Item::Card(card_id) = card else {
            unreachable!("child of a list is a card");
        };
        assert_eq!(owning_card(&fixture.store, subtask).await.unwrap(), card_id);
        assert_eq!(owning_card(&fixture.store, card).await.unwrap(), card_id);
        assert_eq!(
            owning_card(&fixture.store, list).await.unwrap_err(),
            ServiceError::InvalidRequest
        );
        assert_eq!(
            enclosing_board(&fixture.store, Container::List(ListId::new()))
                .await
                .unwrap_err(),
            ServiceError::NotFound
        );
    }

    #[tokio::test]
    async fn subtree_lists_root_first_and_guards_every_container() {
        let fixture = Fixture::new().await;
        let list = fixture.list().await;
        let card = fixture.child(list).await;
        let task = fixture.child(card).await;
        let subtask = fixture.child(task).await;
        let sibling_task = fixture.child(card).await;

        let subtree = collect_subtree(&fixture.store, card).await.unwrap();
        assert_eq!(subtree.items[0], card);
        assert_eq!(subtree.items.len(), 4);
        assert!(subtree.items.contains(&subtask));
        assert!(subtree.items.contains(&sibling_task));
        // card and both tasks open containers; the subtask does not
        assert_eq!(subtree.versions.len(), 3);
    }
}
