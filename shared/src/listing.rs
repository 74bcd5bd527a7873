//! Query, sort and paginate contract shared by every listed resource.
//!
//! A [`ListController`] owns the canonical collection for one record type
//! and the user's current [`ListQuery`]. The visible page is never stored:
//! [`derive_view`] recomputes it from the collection and the query.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::event::{require_non_empty, ValidationError};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Text shown for, and matched against, a field with no value.
pub const ABSENT_PLACEHOLDER: &str = "N/A";

/// A single field of a record as seen by filtering and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(u64),
    Flag(bool),
    Absent,
}

impl FieldValue<'_> {
    /// Empty filter text matches everything.
    pub fn matches(&self, filter: &str) -> bool {
        if filter.is_empty() {
            return true;
        }
        match self {
            FieldValue::Text(text) => text.contains(filter),
            FieldValue::Number(n) => filter.trim().parse::<u64>().is_ok_and(|wanted| wanted == *n),
            FieldValue::Flag(flag) => flag_text(*flag).contains(filter),
            FieldValue::Absent => filter == ABSENT_PLACEHOLDER,
        }
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.cmp(b),
            (FieldValue::Flag(a), FieldValue::Flag(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Absent => 0,
            FieldValue::Flag(_) => 1,
            FieldValue::Number(_) => 2,
            FieldValue::Text(_) => 3,
        }
    }
}

fn flag_text(flag: bool) -> &'static str {
    if flag {
        "true"
    } else {
        "false"
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Flag(flag) => f.write_str(flag_text(*flag)),
            FieldValue::Absent => f.write_str(ABSENT_PLACEHOLDER),
        }
    }
}

/// A record type that can be managed by a [`ListController`].
pub trait Listed: Clone + fmt::Debug + PartialEq + Serialize + Send + 'static {
    /// Identifier used by the backend routes.
    type Id: Clone + fmt::Debug + fmt::Display + PartialEq + Send + 'static;
    /// Value that must be unique across the collection.
    type Key: Clone + Ord + fmt::Debug + fmt::Display + Send + 'static;
    type Field: Copy + Eq + fmt::Debug + Serialize + Send + 'static;
    type Draft: Clone + fmt::Debug + Send + 'static;

    const DEFAULT_FILTER_FIELD: Self::Field;
    const DEFAULT_SORT_FIELD: Self::Field;

    fn id(&self) -> &Self::Id;
    fn key(&self) -> &Self::Key;
    fn field(&self, field: Self::Field) -> FieldValue<'_>;

    /// Fields that must be non-empty, in the order they are checked.
    fn required_fields(draft: &Self::Draft) -> Vec<(&'static str, &str)>;

    /// Syntax check of a draft, yielding the key it would occupy.
    fn draft_key(draft: &Self::Draft) -> Result<Self::Key, ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListQuery<F> {
    pub filter_field: F,
    pub filter_text: String,
    pub sort_field: F,
    pub ascending: bool,
    pub page: usize,
}

impl<F: Copy> ListQuery<F> {
    pub fn new(filter_field: F, sort_field: F) -> Self {
        Self {
            filter_field,
            filter_text: String::new(),
            sort_field,
            ascending: true,
            page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListView<R> {
    pub records: Vec<R>,
    pub page: usize,
    pub total_pages: usize,
    /// Records surviving the filter, across all pages.
    pub matching: usize,
    pub total: usize,
}

/// `floor((len - 1) / page_size) + 1`, never less than one.
pub fn total_pages(len: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    match len {
        0 => 1,
        n => (n - 1) / page_size + 1,
    }
}

fn sort_order<R: Listed>(a: &R, b: &R, field: R::Field, ascending: bool) -> Ordering {
    let order = a.field(field).compare(&b.field(field));
    if ascending {
        order
    } else {
        order.reverse()
    }
}

/// Filter, then stable sort, then slice out the requested page.
///
/// The requested page is clamped into `1..=total_pages`.
pub fn derive_view<R: Listed>(
    records: &[R],
    query: &ListQuery<R::Field>,
    page_size: usize,
) -> ListView<R> {
    let page_size = page_size.max(1);

    let mut filtered: Vec<&R> = records
        .iter()
        .filter(|r| r.field(query.filter_field).matches(&query.filter_text))
        .collect();
    filtered.sort_by(|a, b| sort_order(*a, *b, query.sort_field, query.ascending));

    let total_pages = total_pages(filtered.len(), page_size);
    let page = query.page.clamp(1, total_pages);
    let start = page_size * (page - 1);
    let end = (page_size * page).min(filtered.len());

    ListView {
        records: filtered[start..end].iter().map(|r| (*r).clone()).collect(),
        page,
        total_pages,
        matching: filtered.len(),
        total: records.len(),
    }
}

/// Operations a user can request on a listed resource.
#[derive(Debug, Clone)]
pub enum ListAction<R: Listed> {
    Refresh,
    Add(R::Draft),
    Edit { id: R::Id, draft: R::Draft },
    Delete { id: R::Id },
    SetFilter { field: R::Field, text: String },
    SetSort { field: R::Field, ascending: bool },
    SetPage { page: usize },
}

impl<R: Listed> ListAction<R> {
    pub const fn name(&self) -> &'static str {
        match self {
            ListAction::Refresh => "refresh",
            ListAction::Add(_) => "add",
            ListAction::Edit { .. } => "edit",
            ListAction::Delete { .. } => "delete",
            ListAction::SetFilter { .. } => "set_filter",
            ListAction::SetSort { .. } => "set_sort",
            ListAction::SetPage { .. } => "set_page",
        }
    }

    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            ListAction::Add(_) | ListAction::Edit { .. } | ListAction::Delete { .. }
        )
    }
}

/// Canonical collection plus query state for one resource type.
///
/// The collection is only changed after the backend confirmed a mutation.
/// Keys of creates and edits still waiting on the backend are reserved so
/// that a second submit of the same identifier is rejected locally. A record
/// with a delete outstanding is not deleted a second time.
#[derive(Debug, Clone)]
pub struct ListController<R: Listed> {
    records: Vec<R>,
    query: ListQuery<R::Field>,
    reserved: BTreeSet<R::Key>,
    deleting: Vec<R::Id>,
    loaded: bool,
    loading: bool,
}

impl<R: Listed> Default for ListController<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            query: ListQuery::new(R::DEFAULT_FILTER_FIELD, R::DEFAULT_SORT_FIELD),
            reserved: BTreeSet::new(),
            deleting: Vec::new(),
            loaded: false,
            loading: false,
        }
    }
}

impl<R: Listed> ListController<R> {
    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn query(&self) -> &ListQuery<R::Field> {
        &self.query
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn find(&self, id: &R::Id) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    fn key_taken(&self, key: &R::Key) -> bool {
        self.reserved.contains(key) || self.records.iter().any(|r| r.key() == key)
    }

    /// Empty fields, then syntax, then uniqueness.
    pub fn check_add(&self, draft: &R::Draft) -> Result<R::Key, ValidationError> {
        require_non_empty(&R::required_fields(draft))?;
        let key = R::draft_key(draft)?;
        if self.key_taken(&key) {
            return Err(ValidationError::RepeatedId(key.to_string()));
        }
        Ok(key)
    }

    /// Like [`Self::check_add`], but the record may keep its own key.
    pub fn check_edit(&self, id: &R::Id, draft: &R::Draft) -> Result<R::Key, ValidationError> {
        let current = self
            .find(id)
            .ok_or_else(|| ValidationError::MissingRecord(id.to_string()))?;
        require_non_empty(&R::required_fields(draft))?;
        let key = R::draft_key(draft)?;
        if key != *current.key() && self.key_taken(&key) {
            return Err(ValidationError::RepeatedId(key.to_string()));
        }
        Ok(key)
    }

    pub fn reserve(&mut self, key: R::Key) -> bool {
        self.reserved.insert(key)
    }

    pub fn release(&mut self, key: &R::Key) {
        self.reserved.remove(key);
    }

    /// False when a delete of `id` is already outstanding.
    pub fn begin_delete(&mut self, id: R::Id) -> bool {
        if self.deleting.contains(&id) {
            return false;
        }
        self.deleting.push(id);
        true
    }

    pub fn end_delete(&mut self, id: &R::Id) {
        self.deleting.retain(|pending| pending != id);
    }

    pub fn begin_refresh(&mut self) {
        self.loading = true;
    }

    pub fn refresh_failed(&mut self) {
        self.loading = false;
    }

    /// Replaces the collection wholesale with a fresh backend listing.
    pub fn replace_all(&mut self, mut records: Vec<R>) {
        let (field, ascending) = (self.query.sort_field, self.query.ascending);
        records.sort_by(|a, b| sort_order(a, b, field, ascending));
        self.records = records;
        self.loaded = true;
        self.loading = false;
    }

    /// Inserts at the position the active sort dictates, after equal keys.
    pub fn insert(&mut self, record: R) {
        let (field, ascending) = (self.query.sort_field, self.query.ascending);
        let at = self
            .records
            .partition_point(|r| sort_order(r, &record, field, ascending) != Ordering::Greater);
        self.records.insert(at, record);
    }

    /// Replaces the record with identifier `id` and restores sort order.
    pub fn apply_edit(&mut self, id: &R::Id, record: R) -> bool {
        let Some(slot) = self.records.iter_mut().find(|r| r.id() == id) else {
            return false;
        };
        *slot = record;
        self.resort();
        true
    }

    pub fn remove(&mut self, id: &R::Id) -> Option<R> {
        self.end_delete(id);
        let at = self.records.iter().position(|r| r.id() == id)?;
        Some(self.records.remove(at))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Changing the filter starts over from the first page.
    pub fn set_filter(&mut self, field: R::Field, text: impl Into<String>) {
        self.query.filter_field = field;
        self.query.filter_text = text.into();
        self.query.page = 1;
    }

    pub fn set_sort(&mut self, field: R::Field, ascending: bool) {
        self.query.sort_field = field;
        self.query.ascending = ascending;
        self.resort();
    }

    pub fn set_page(&mut self, page: usize) {
        self.query.page = page.max(1);
    }

    pub fn view(&self, page_size: usize) -> ListView<R> {
        derive_view(&self.records, &self.query, page_size)
    }

    fn resort(&mut self) {
        let (field, ascending) = (self.query.sort_field, self.query.ascending);
        self.records.sort_by(|a, b| sort_order(a, b, field, ascending));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Row {
        id: u32,
        name: String,
        score: u64,
        note: Option<String>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    enum RowField {
        Name,
        Score,
        Note,
    }

    #[derive(Debug, Clone)]
    struct RowDraft {
        name: String,
    }

    impl Listed for Row {
        type Id = u32;
        type Key = String;
        type Field = RowField;
        type Draft = RowDraft;

        const DEFAULT_FILTER_FIELD: RowField = RowField::Name;
        const DEFAULT_SORT_FIELD: RowField = RowField::Name;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn key(&self) -> &String {
            &self.name
        }

        fn field(&self, field: RowField) -> FieldValue<'_> {
            match field {
                RowField::Name => FieldValue::Text(&self.name),
                RowField::Score => FieldValue::Number(self.score),
                RowField::Note => self
                    .note
                    .as_deref()
                    .map_or(FieldValue::Absent, FieldValue::Text),
            }
        }

        fn required_fields(draft: &RowDraft) -> Vec<(&'static str, &str)> {
            vec![("name", draft.name.as_str())]
        }

        fn draft_key(draft: &RowDraft) -> Result<String, ValidationError> {
            if draft.name.starts_with(char::is_uppercase) {
                Ok(draft.name.clone())
            } else {
                Err(ValidationError::syntax("name", "must start upper-case"))
            }
        }
    }

    fn row(id: u32, name: &str, score: u64) -> Row {
        Row {
            id,
            name: name.into(),
            score,
            note: None,
        }
    }

    fn draft(name: &str) -> RowDraft {
        RowDraft { name: name.into() }
    }

    mod field_value_tests {
        use super::*;

        #[test]
        fn test_text_is_case_sensitive_substring() {
            let v = FieldValue::Text("A0000000000000000000001");
            assert!(v.matches("01"));
            assert!(v.matches(""));
            assert!(!v.matches("99"));
            assert!(!FieldValue::Text("Alpha").matches("alpha"));
        }

        #[test]
        fn test_number_compares_parsed_equality() {
            let v = FieldValue::Number(12);
            assert!(v.matches("12"));
            assert!(v.matches(" 12 "));
            assert!(!v.matches("1"));
            assert!(!v.matches("twelve"));
        }

        #[test]
        fn test_absent_matches_only_placeholder() {
            assert!(FieldValue::Absent.matches(ABSENT_PLACEHOLDER));
            assert!(!FieldValue::Absent.matches("N"));
            assert_eq!(FieldValue::Absent.to_string(), "N/A");
        }

        #[test]
        fn test_flag_renders_and_matches() {
            assert!(FieldValue::Flag(true).matches("tru"));
            assert!(!FieldValue::Flag(false).matches("true"));
            assert_eq!(FieldValue::Flag(false).compare(&FieldValue::Flag(true)), Ordering::Less);
        }

        #[test]
        fn test_absent_sorts_first() {
            assert_eq!(FieldValue::Absent.compare(&FieldValue::Text("")), Ordering::Less);
            assert_eq!(FieldValue::Number(3).compare(&FieldValue::Number(20)), Ordering::Less);
            assert_eq!(FieldValue::Text("b").compare(&FieldValue::Text("ab")), Ordering::Greater);
        }
    }

    mod derive_view_tests {
        use super::*;

        #[test]
        fn test_total_pages_formula() {
            assert_eq!(total_pages(0, 10), 1);
            assert_eq!(total_pages(1, 10), 1);
            assert_eq!(total_pages(10, 10), 1);
            assert_eq!(total_pages(11, 10), 2);
            assert_eq!(total_pages(25, 10), 3);
        }

        #[test]
        fn test_empty_result_has_one_page() {
            let rows = vec![row(1, "Alpha", 1)];
            let mut query = ListQuery::new(RowField::Name, RowField::Name);
            query.filter_text = "zzz".into();
            let view = derive_view(&rows, &query, 10);
            assert!(view.records.is_empty());
            assert_eq!(view.total_pages, 1);
            assert_eq!(view.page, 1);
            assert_eq!(view.total, 1);
        }

        #[test]
        fn test_sort_is_stable_in_both_directions() {
            let rows = vec![row(1, "B", 5), row(2, "A", 5), row(3, "C", 1)];
            let mut query = ListQuery::new(RowField::Name, RowField::Score);
            let ids = |v: ListView<Row>| v.records.iter().map(|r| r.id).collect::<Vec<_>>();

            assert_eq!(ids(derive_view(&rows, &query, 10)), vec![3, 1, 2]);
            query.ascending = false;
            assert_eq!(ids(derive_view(&rows, &query, 10)), vec![1, 2, 3]);
        }

        #[test]
        fn test_page_is_clamped() {
            let rows: Vec<Row> = (0..25).map(|i| row(i, &format!("R{i:02}"), 0)).collect();
            let mut query = ListQuery::new(RowField::Name, RowField::Name);
            query.page = 9;
            let view = derive_view(&rows, &query, 10);
            assert_eq!(view.page, 3);
            assert_eq!(view.records.len(), 5);

            query.page = 0;
            assert_eq!(derive_view(&rows, &query, 10).page, 1);
        }

        proptest! {
            #[test]
            fn prop_pages_cover_sequence_exactly_once(len in 0usize..60, size in 1usize..15) {
                let rows: Vec<Row> = (0..len as u32).map(|i| row(i, "Same", u64::from(i % 7))).collect();
                let mut query = ListQuery::new(RowField::Name, RowField::Score);
                let all = derive_view(&rows, &query, usize::MAX).records;

                let pages = total_pages(len, size);
                prop_assert_eq!(pages, if len == 0 { 1 } else { (len - 1) / size + 1 });

                let mut seen = Vec::new();
                for page in 1..=pages {
                    query.page = page;
                    let view = derive_view(&rows, &query, size);
                    prop_assert!(view.records.len() <= size);
                    seen.extend(view.records);
                }
                prop_assert_eq!(seen, all);
            }
        }
    }

    mod controller_tests {
        use super::*;

        fn controller(rows: Vec<Row>) -> ListController<Row> {
            let mut c = ListController::default();
            c.replace_all(rows);
            c
        }

        #[test]
        fn test_check_add_order() {
            let c = controller(vec![row(1, "Alpha", 0)]);
            assert_eq!(
                c.check_add(&draft("")),
                Err(ValidationError::EmptyInput { field: "name" })
            );
            assert!(matches!(c.check_add(&draft("alpha")), Err(ValidationError::Syntax { .. })));
            assert_eq!(
                c.check_add(&draft("Alpha")),
                Err(ValidationError::RepeatedId("Alpha".into()))
            );
            assert_eq!(c.check_add(&draft("Beta")), Ok("Beta".to_string()));
        }

        #[test]
        fn test_reserved_key_is_repeated() {
            let mut c = controller(vec![]);
            assert!(c.reserve("Beta".into()));
            assert_eq!(
                c.check_add(&draft("Beta")),
                Err(ValidationError::RepeatedId("Beta".into()))
            );
            c.release(&"Beta".to_string());
            assert!(c.check_add(&draft("Beta")).is_ok());
        }

        #[test]
        fn test_pending_delete_blocks_second_delete() {
            let mut c = controller(vec![row(1, "A", 1), row(2, "B", 2)]);
            assert!(c.begin_delete(1));
            assert!(!c.begin_delete(1));
            assert!(c.begin_delete(2));

            c.end_delete(&2);
            assert!(c.begin_delete(2));

            c.remove(&1);
            assert!(c.begin_delete(1));
        }

        #[test]
        fn test_check_edit_allows_own_key() {
            let c = controller(vec![row(1, "Alpha", 0), row(2, "Beta", 0)]);
            assert!(c.check_edit(&1, &draft("Alpha")).is_ok());
            assert_eq!(
                c.check_edit(&1, &draft("Beta")),
                Err(ValidationError::RepeatedId("Beta".into()))
            );
            assert_eq!(
                c.check_edit(&9, &draft("Gamma")),
                Err(ValidationError::MissingRecord("9".into()))
            );
        }

        #[test]
        fn test_insert_keeps_sort_order() {
            let mut c = controller(vec![row(1, "A", 1), row(2, "C", 3)]);
            c.set_sort(RowField::Score, true);
            c.insert(row(3, "B", 2));
            c.insert(row(4, "D", 1));
            let ids: Vec<u32> = c.records().iter().map(|r| r.id).collect();
            assert_eq!(ids, vec![1, 4, 3, 2]);
        }

        #[test]
        fn test_apply_edit_resorts() {
            let mut c = controller(vec![row(1, "A", 1), row(2, "B", 2)]);
            assert!(c.apply_edit(&1, row(1, "Z", 1)));
            assert_eq!(c.records()[1].name, "Z");
            assert!(!c.apply_edit(&7, row(7, "Q", 0)));
        }

        #[test]
        fn test_remove_and_refresh_idempotent() {
            let rows = vec![row(1, "A", 1), row(2, "B", 2)];
            let mut c = controller(rows.clone());
            let first = c.view(10);
            c.replace_all(rows);
            assert_eq!(c.view(10), first);

            assert_eq!(c.remove(&1).map(|r| r.id), Some(1));
            assert!(c.remove(&1).is_none());
            assert_eq!(c.records().len(), 1);
        }

        #[test]
        fn test_setters() {
            let mut c = controller(vec![row(1, "A", 1)]);
            c.set_page(0);
            assert_eq!(c.query().page, 1);
            c.set_page(3);
            c.set_filter(RowField::Note, "N/A");
            assert_eq!(c.query().page, 1);
            assert_eq!(c.view(10).records.len(), 1);
            c.clear();
            assert!(!c.is_loaded());
            assert!(c.records().is_empty());
        }
    }
}
