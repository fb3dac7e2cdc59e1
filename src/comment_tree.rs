//! Reassembles a post's flat comment rows into reply threads.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// One stored comment, as loaded for a post.
#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub author_nickname: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub author_nickname: Option<String>,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    fn from_row(row: CommentRow, replies: Vec<CommentNode>) -> Self {
        // Tombstones keep their place in the thread but nothing else
        let (user_id, author_nickname, content) = if row.is_deleted {
            (None, None, String::new())
        } else {
            (Some(row.user_id), Some(row.author_nickname), row.content)
        };

        Self {
            id: row.id,
            post_id: row.post_id,
            user_id,
            author_nickname,
            parent_id: row.parent_id,
            content,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
            replies,
        }
    }
}

/// Build the reply forest for one post.
///
/// `rows` must be ordered by `(created_at, id)`, which places every parent
/// before its replies. Siblings keep that order. A deleted comment survives
/// as a tombstone only while some reply beneath it is still live; deleted
/// leaves are dropped. A row whose parent is not in `rows` becomes a root.
pub fn build_tree(rows: Vec<CommentRow>) -> Vec<CommentNode> {
    let present: HashSet<i64> = rows.iter().map(|r| r.id).collect();

    // Walk newest-first so every reply is finished before its parent.
    let mut pending: HashMap<i64, Vec<CommentNode>> = HashMap::new();
    let mut roots = Vec::new();

    for row in rows.into_iter().rev() {
        let mut replies = pending.remove(&row.id).unwrap_or_default();
        if row.is_deleted && replies.is_empty() {
            continue;
        }
        replies.reverse();

        let parent = row.parent_id.filter(|p| present.contains(p));
        let node = CommentNode::from_row(row, replies);
        match parent {
            Some(parent_id) => pending.entry(parent_id).or_default().push(node),
            None => roots.push(node),
        }
    }

    roots.reverse();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent_id: Option<i64>, is_deleted: bool) -> CommentRow {
        CommentRow {
            id,
            post_id: 1,
            user_id: 10 + id,
            author_nickname: format!("user{id}"),
            parent_id,
            content: format!("comment {id}"),
            is_deleted,
            created_at: format!("2024-01-01 00:00:{id:02}"),
            updated_at: format!("2024-01-01 00:00:{id:02}"),
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[test]
    fn empty_input_gives_empty_forest() {
        assert!(build_tree(Vec::new()).is_empty());
    }

    #[test]
    fn chain_nests_in_order() {
        // A <- B <- C
        let tree = build_tree(vec![row(1, None, false), row(2, Some(1), false), row(3, Some(2), false)]);
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].replies), vec![2]);
        assert_eq!(ids(&tree[0].replies[0].replies), vec![3]);
        assert!(tree[0].replies[0].replies[0].replies.is_empty());
    }

    #[test]
    fn siblings_keep_creation_order() {
        let tree = build_tree(vec![
            row(1, None, false),
            row(2, None, false),
            row(3, Some(1), false),
            row(4, Some(1), false),
            row(5, Some(2), false),
            row(6, Some(1), false),
        ]);
        assert_eq!(ids(&tree), vec![1, 2]);
        assert_eq!(ids(&tree[0].replies), vec![3, 4, 6]);
        assert_eq!(ids(&tree[1].replies), vec![5]);
    }

    #[test]
    fn deleted_parent_with_live_reply_becomes_tombstone() {
        let tree = build_tree(vec![row(1, None, true), row(2, Some(1), false)]);
        assert_eq!(ids(&tree), vec![1]);
        let tombstone = &tree[0];
        assert!(tombstone.is_deleted);
        assert!(tombstone.content.is_empty());
        assert!(tombstone.author_nickname.is_none());
        assert_eq!(ids(&tombstone.replies), vec![2]);
        assert_eq!(tombstone.replies[0].content, "comment 2");
    }

    #[test]
    fn deleted_leaves_are_pruned() {
        let tree = build_tree(vec![row(1, None, false), row(2, Some(1), true), row(3, None, true)]);
        assert_eq!(ids(&tree), vec![1]);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn fully_deleted_branch_disappears() {
        let tree = build_tree(vec![row(1, None, true), row(2, Some(1), true), row(3, Some(2), true)]);
        assert!(tree.is_empty());
    }

    #[test]
    fn deep_live_reply_keeps_every_deleted_ancestor() {
        let tree = build_tree(vec![
            row(1, None, true),
            row(2, Some(1), true),
            row(3, Some(2), false),
        ]);
        assert_eq!(ids(&tree), vec![1]);
        assert!(tree[0].is_deleted);
        assert!(tree[0].replies[0].is_deleted);
        assert!(!tree[0].replies[0].replies[0].is_deleted);
    }

    #[test]
    fn reply_to_missing_parent_becomes_root() {
        let tree = build_tree(vec![row(1, None, false), row(5, Some(99), false)]);
        assert_eq!(ids(&tree), vec![1, 5]);
    }
}
