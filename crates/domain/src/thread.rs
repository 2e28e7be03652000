use crate::models::{Comment, CommentEntry};
use crate::query::CommentSort;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentWithReplies {
    pub root: CommentEntry,
    pub replies: Vec<CommentEntry>,
    pub reply_count: usize,
}

impl CommentWithReplies {
    pub fn new(root: impl Into<CommentEntry>, replies: Vec<CommentEntry>) -> Self {
        let mut thread = Self {
            root: root.into(),
            replies,
            reply_count: 0,
        };
        thread.replies.sort_by(chronological);
        thread.recount();
        thread
    }

    pub fn id(&self) -> &str {
        self.root.id()
    }

    // 根评论时间与最新回复取较晚者
    pub fn latest_activity(&self) -> NaiveDateTime {
        self.replies
            .iter()
            .map(CommentEntry::created_at)
            .fold(self.root.created_at(), NaiveDateTime::max)
    }

    pub fn recount(&mut self) {
        self.reply_count = self.replies.iter().filter(|r| !r.is_deleted()).count();
    }

    pub fn push_reply(&mut self, reply: impl Into<CommentEntry>) {
        self.replies.push(reply.into());
        self.replies.sort_by(chronological);
        self.recount();
    }

    pub fn replace_reply(&mut self, comment: &Comment) -> Option<CommentEntry> {
        let slot = self.replies.iter_mut().find(|r| r.id() == comment.id)?;
        let previous = std::mem::replace(slot, CommentEntry::Confirmed(comment.clone()));
        self.replies.sort_by(chronological);
        self.recount();
        Some(previous)
    }
}

pub fn assemble(comments: Vec<Comment>, sort: CommentSort) -> Vec<CommentWithReplies> {
    let mut roots = Vec::new();
    let mut replies: HashMap<String, Vec<CommentEntry>> = HashMap::new();

    for comment in comments {
        match comment.parent_id.clone() {
            None => roots.push(comment),
            Some(parent) => replies
                .entry(parent)
                .or_default()
                .push(CommentEntry::Confirmed(comment)),
        }
    }

    // 找不到根评论的回复直接丢弃
    let mut threads: Vec<CommentWithReplies> = roots
        .into_iter()
        .map(|root| {
            let own = replies.remove(&root.id).unwrap_or_default();
            CommentWithReplies::new(root, own)
        })
        .collect();

    sort_roots(&mut threads, sort);
    threads
}

// 回复总是按时间排序，这里只排根评论
pub fn sort_roots(threads: &mut [CommentWithReplies], sort: CommentSort) {
    threads.sort_by(|a, b| compare_roots(a, b, sort));
}

fn compare_roots(a: &CommentWithReplies, b: &CommentWithReplies, sort: CommentSort) -> Ordering {
    let by_time = match sort {
        CommentSort::Oldest => a.root.created_at().cmp(&b.root.created_at()),
        CommentSort::Newest => b.root.created_at().cmp(&a.root.created_at()),
        CommentSort::Thread => b
            .latest_activity()
            .cmp(&a.latest_activity())
            .then_with(|| b.root.created_at().cmp(&a.root.created_at())),
    };
    by_time.then_with(|| a.id().cmp(b.id()))
}

fn chronological(a: &CommentEntry, b: &CommentEntry) -> Ordering {
    a.created_at()
        .cmp(&b.created_at())
        .then_with(|| a.id().cmp(b.id()))
}
