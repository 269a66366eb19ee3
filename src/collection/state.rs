use std::collections::HashSet;
use std::time::SystemTime;

use crate::core::{Item, ItemId, PagingState, Variables};

/// 通过 watch 通道发布的状态快照。每次经由唯一提交点的修改都会递增 `revision`。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionStatus {
    pub revision: u64,
    pub len: usize,
    pub groups: usize,
    pub loading: bool,
    pub refreshing: bool,
    pub has_more: bool,
    /// 最近一次后台失败（fetch / before_refresh）。成功的 fetch 会清空。
    pub last_error: Option<String>,
}

pub(crate) struct CollectionState<T> {
    pub items: Vec<T>,
    pub ids: HashSet<ItemId>,
    pub loading: bool,
    pub refreshing: bool,
    pub has_more: bool,
    pub variables: Variables,
    pub paging_started: SystemTime,
    pub chunked: Vec<Vec<T>>,
    /// 最后一个完整分组之后的 ring 下标
    pub chunk_cursor: usize,
    pub revision: u64,
    pub last_error: Option<String>,
}

impl<T: Item> CollectionState<T> {
    pub fn new(variables: Variables, has_more: bool) -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            loading: false,
            refreshing: false,
            has_more,
            variables,
            paging_started: SystemTime::now(),
            chunked: Vec::new(),
            chunk_cursor: 0,
            revision: 0,
            last_error: None,
        }
    }

    /// 过滤掉已存在的身份以及批次内部的重复，保持批次原有顺序。
    pub fn take_new(&self, batch: Vec<T>) -> Vec<T> {
        let mut seen = HashSet::with_capacity(batch.len());
        batch
            .into_iter()
            .filter(|it| {
                let id = it.id();
                !self.ids.contains(&id) && seen.insert(id)
            })
            .collect()
    }

    pub fn push_back(&mut self, fresh: Vec<T>) {
        self.ids.extend(fresh.iter().map(Item::id));
        self.items.extend(fresh);
    }

    pub fn push_front(&mut self, fresh: Vec<T>) {
        self.ids.extend(fresh.iter().map(Item::id));
        let tail = std::mem::replace(&mut self.items, fresh);
        self.items.extend(tail);
    }

    pub fn replace_items(&mut self, items: Vec<T>) {
        let items = dedup_by_id(items);
        self.ids = items.iter().map(Item::id).collect();
        self.items = items;
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
        self.ids.clear();
    }

    pub fn clear_chunks(&mut self) {
        self.chunked.clear();
        self.chunk_cursor = 0;
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter().position(|it| &it.id() == id)
    }

    pub fn remove(&mut self, id: &ItemId) -> bool {
        match self.position(id) {
            Some(i) => {
                self.items.remove(i);
                self.ids.remove(id);
                true
            }
            None => false,
        }
    }

    pub fn paging_vars(&self, limit: usize) -> PagingState {
        PagingState {
            offset: self.items.len(),
            limit,
            paging_started: self.paging_started,
            up_to: None,
        }
    }

    pub fn status(&self) -> CollectionStatus {
        CollectionStatus {
            revision: self.revision,
            len: self.items.len(),
            groups: self.chunked.len(),
            loading: self.loading,
            refreshing: self.refreshing,
            has_more: self.has_more,
            last_error: self.last_error.clone(),
        }
    }
}

/// 按身份去重，保留首次出现。
pub fn dedup_by_id<T: Item>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|it| seen.insert(it.id())).collect()
}
