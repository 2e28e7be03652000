use crate::models::Comment;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    Newest,
    Oldest,
    Thread,
}

impl CommentSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Newest => "newest",
            CommentSort::Oldest => "oldest",
            CommentSort::Thread => "thread",
        }
    }
}

impl fmt::Display for CommentSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommentSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(CommentSort::Newest),
            "oldest" => Ok(CommentSort::Oldest),
            "thread" => Ok(CommentSort::Thread),
            other => Err(format!("Unknown sort option: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentFilter {
    #[default]
    Any,
    RootsOnly,
    RepliesTo(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentFilters {
    pub author_id: Option<String>,
    #[serde(default)]
    pub parent: ParentFilter,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
    pub search: Option<String>,
}

impl CommentFilters {
    pub fn is_empty(&self) -> bool {
        *self == CommentFilters::default()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    // 与存储层的 WHERE 条件对应，不含软删除过滤
    pub fn matches(&self, c: &Comment) -> bool {
        if let Some(author) = &self.author_id {
            if &c.author_id != author {
                return false;
            }
        }

        match &self.parent {
            ParentFilter::Any => {}
            ParentFilter::RootsOnly if c.parent_id.is_some() => return false,
            ParentFilter::RepliesTo(p) if c.parent_id.as_deref() != Some(p.as_str()) => {
                return false
            }
            _ => {}
        }

        if matches!(self.date_from, Some(from) if c.created_at < from) {
            return false;
        }
        if matches!(self.date_to, Some(to) if c.created_at > to) {
            return false;
        }

        match self.search_term() {
            Some(term) => {
                // 和 SQLite 的 lower() 一样，只折叠 ASCII 大小写
                let term = term.to_ascii_lowercase();
                c.content.to_ascii_lowercase().contains(&term)
                    || c.author_name.to_ascii_lowercase().contains(&term)
            }
            None => true,
        }
    }
}
