//! SharedList - aliased list of tagged values
//!
//! A `SharedList` is a handle to a [`ListData`] record. Copying the handle
//! aliases the record: a mutation through any copy is seen by all of them.
//! This is the opposite of [`SharedBuffer`], which copies on write; use
//! [`SharedList::duplicate`] to get an independent list.
//!
//! ```text
//!  a ──┐
//!      ├──▶ ListData { header (strong = 2), read_only, items: SharedBuffer<TaggedValue> }
//!  b ──┘
//! ```
//!
//! `ListData` is an [`OwnedObject`], so its lifetime is an ordinary strong
//! count held by the handles; the last handle to go frees it. The element
//! buffer sits in a `RefCell`, which makes lists single-threaded.
//!
//! Lists can contain themselves. Structural comparison and formatting stop at
//! [`MAX_RECURSION_DEPTH`]; reference cycles are never freed.

use crate::buffer::SharedBuffer;
use crate::diagnostics::{self, Diagnostic, Severity};
use crate::error::ErrorCode;
use crate::object::{Handle, ObjectHeader, OwnedObject};
use crate::value::TaggedValue;
use crate::{ensure, fail};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;

/// Nesting limit for comparing and printing nested lists
pub const MAX_RECURSION_DEPTH: usize = 100;

/// Report that a recursive walk gave up at `MAX_RECURSION_DEPTH`.
pub(crate) fn report_recursion_limit(what: &str) {
    diagnostics::report(Diagnostic::new(
        Severity::Error,
        "Max recursion reached.",
        format!("{} nested deeper than {} levels", what, MAX_RECURSION_DEPTH),
        ErrorCode::Failed,
        file!(),
        line!(),
        module_path!(),
    ));
}

/// Heap record shared by aliasing `SharedList` handles.
pub struct ListData {
    header: ObjectHeader,
    items: RefCell<SharedBuffer<TaggedValue>>,
    read_only: Cell<bool>,
}

impl ListData {
    fn with_items(items: SharedBuffer<TaggedValue>) -> Self {
        Self {
            header: ObjectHeader::new(),
            items: RefCell::new(items),
            read_only: Cell::new(false),
        }
    }
}

impl OwnedObject for ListData {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn class_name(&self) -> &'static str {
        "ListData"
    }
}

/// Handle to an aliased list. See the [module docs](self).
#[derive(Clone)]
pub struct SharedList {
    data: Handle<ListData>,
}

impl Default for SharedList {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedList {
    pub fn new() -> Self {
        Self::from_buffer(SharedBuffer::new())
    }

    pub fn from_values(values: impl IntoIterator<Item = TaggedValue>) -> Self {
        Self::from_buffer(values.into_iter().collect())
    }

    fn from_buffer(items: SharedBuffer<TaggedValue>) -> Self {
        Self {
            data: Handle::new(ListData::with_items(items)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.items.borrow().len()
    }

    /// Same as `len`
    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.data.read_only.get()
    }

    /// Freeze or unfreeze the list for every aliasing handle.
    pub fn set_read_only(&self, read_only: bool) {
        self.data.read_only.set(read_only);
    }

    /// True if both handles alias the same list
    pub fn ptr_eq(&self, other: &SharedList) -> bool {
        self.data.ptr_eq(&other.data)
    }

    /// Number of handles aliasing this list
    pub fn handle_count(&self) -> u64 {
        self.data.refcount()
    }

    /// Borrow the elements.
    ///
    /// Mutations through any aliasing handle fail with `Unavailable` while
    /// the borrow is alive.
    pub fn items(&self) -> Ref<'_, [TaggedValue]> {
        Ref::map(self.data.items.borrow(), |items| items.as_slice())
    }

    pub fn to_vec(&self) -> Vec<TaggedValue> {
        self.items().to_vec()
    }

    /// Element at `index`. Out of range is fatal.
    pub fn get(&self, index: usize) -> TaggedValue {
        self.data.items.borrow().get(index).clone()
    }

    pub fn find(&self, value: &TaggedValue) -> Option<usize> {
        self.items().iter().position(|item| item == value)
    }

    /// A new, writable list with the same elements.
    ///
    /// The element buffer is shared copy-on-write, so this is O(1) until
    /// either list changes.
    pub fn duplicate(&self) -> SharedList {
        Self::from_buffer(self.data.items.borrow().clone())
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    fn writable(&self, action: &str) -> Result<RefMut<'_, SharedBuffer<TaggedValue>>, ErrorCode> {
        ensure!(
            !self.data.read_only.get(),
            ErrorCode::Unavailable,
            "Can't {} a read-only list.",
            action
        );
        match self.data.items.try_borrow_mut() {
            Ok(items) => Ok(items),
            Err(_) => fail!(
                ErrorCode::Unavailable,
                "Can't {} a list while its items are borrowed.",
                action
            ),
        }
    }

    fn removable(&self) -> Result<RefMut<'_, SharedBuffer<TaggedValue>>, ErrorCode> {
        ensure!(
            !self.is_empty(),
            ErrorCode::InvalidParameter,
            "Cannot remove an item from an empty list."
        );
        self.writable("remove elements from")
    }

    /// Overwrite the element at `index`. Out of range is fatal.
    pub fn set(&self, index: usize, value: TaggedValue) -> Result<(), ErrorCode> {
        let mut items = self.writable("change elements of")?;
        crate::index_or_fatal!(index, items.len());
        let old = std::mem::replace(items.get_mut(index), value);
        // The old value may hold the last handle to another list
        drop(items);
        drop(old);
        Ok(())
    }

    pub fn append(&self, value: TaggedValue) -> Result<(), ErrorCode> {
        self.push_back(value)
    }

    pub fn push_back(&self, value: TaggedValue) -> Result<(), ErrorCode> {
        self.writable("add elements to")?.push_back(value)
    }

    pub fn push_front(&self, value: TaggedValue) -> Result<(), ErrorCode> {
        self.writable("add elements to")?.push_front(value)
    }

    /// Insert before `index`; `index == len()` appends.
    pub fn insert(&self, index: usize, value: TaggedValue) -> Result<(), ErrorCode> {
        self.writable("add elements to")?.insert_at(index, value)
    }

    pub fn remove_at(&self, index: usize) -> Result<TaggedValue, ErrorCode> {
        self.removable()?.remove_at(index)
    }

    pub fn pop_back(&self) -> Result<TaggedValue, ErrorCode> {
        let mut items = self.removable()?;
        let last = items.len() - 1;
        items.remove_at(last)
    }

    pub fn pop_front(&self) -> Result<TaggedValue, ErrorCode> {
        self.removable()?.remove_at(0)
    }

    /// Remove every element. A no-op on an empty list.
    pub fn clear(&self) -> Result<(), ErrorCode> {
        if self.is_empty() {
            return Ok(());
        }
        let old = std::mem::take(&mut *self.writable("remove elements from")?);
        drop(old);
        Ok(())
    }

    /// Set every element to `value`. A no-op on an empty list.
    pub fn fill(&self, value: TaggedValue) -> Result<(), ErrorCode> {
        if self.is_empty() {
            return Ok(());
        }
        self.writable("change elements of")?.fill(value)
    }

    // -------------------------------------------------------------------------
    // Comparison
    // -------------------------------------------------------------------------

    /// Element-wise equality; aliasing handles are equal without looking.
    pub fn is_equal(&self, other: &SharedList) -> bool {
        self.is_equal_at(other, 0)
    }

    pub(crate) fn is_equal_at(&self, other: &SharedList, depth: usize) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if depth > MAX_RECURSION_DEPTH {
            report_recursion_limit("list comparison");
            return false;
        }
        let (a, b) = (self.items(), other.items());
        a.len() == b.len()
            && a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| x.hash_compare(y, depth + 1))
    }

    pub(crate) fn fmt_at(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth > MAX_RECURSION_DEPTH {
            return f.write_str("[...]");
        }
        f.write_str("[")?;
        for (i, item) in self.items().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            item.fmt_at(f, depth + 1)?;
        }
        f.write_str("]")
    }
}

impl PartialEq for SharedList {
    fn eq(&self, other: &SharedList) -> bool {
        self.is_equal(other)
    }
}

impl fmt::Display for SharedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, 0)
    }
}

impl fmt::Debug for SharedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedList(")?;
        self.fmt_at(f, 0)?;
        write!(f, ")")
    }
}

impl FromIterator<TaggedValue> for SharedList {
    fn from_iter<I: IntoIterator<Item = TaggedValue>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, clear_last_diagnostic, take_last_diagnostic, with_sink};
    use std::rc::Rc;

    fn ints(values: &[i64]) -> SharedList {
        values.iter().map(|v| TaggedValue::from(*v)).collect()
    }

    #[test]
    fn test_copies_alias() {
        let a = SharedList::new();
        a.append(1.into()).unwrap();
        a.append(2.into()).unwrap();
        let b = a.clone();
        b.append(3.into()).unwrap();
        assert_eq!(a.size(), 3);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.handle_count(), 2);
        drop(b);
        assert_eq!(a.handle_count(), 1);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let a = ints(&[1, 2]);
        let b = a.duplicate();
        assert!(!a.ptr_eq(&b));
        assert!(a.is_equal(&b));
        b.push_front(0.into()).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.to_vec(), vec![TaggedValue::Int(0), 1.into(), 2.into()]);
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let a = ints(&[1]);
        let alias = a.clone();
        a.set_read_only(true);
        assert!(alias.is_read_only());

        clear_last_diagnostic();
        assert_eq!(alias.append(2.into()), Err(ErrorCode::Unavailable));
        let diag = take_last_diagnostic().unwrap();
        assert!(diag.message.contains("read-only"));
        assert_eq!(alias.pop_back(), Err(ErrorCode::Unavailable));
        assert_eq!(alias.clear(), Err(ErrorCode::Unavailable));
        assert_eq!(alias.fill(TaggedValue::Nil), Err(ErrorCode::Unavailable));
        assert_eq!(alias.set(0, 5.into()), Err(ErrorCode::Unavailable));
        assert_eq!(a.to_vec(), vec![TaggedValue::Int(1)]);

        a.set_read_only(false);
        assert!(alias.append(2.into()).is_ok());
    }

    #[test]
    fn test_removal_from_empty_list() {
        let list = SharedList::new();
        assert_eq!(list.pop_back(), Err(ErrorCode::InvalidParameter));
        assert_eq!(list.pop_front(), Err(ErrorCode::InvalidParameter));
        assert_eq!(list.remove_at(0), Err(ErrorCode::InvalidParameter));
        // Clearing or filling nothing is fine
        assert_eq!(list.clear(), Ok(()));
        assert_eq!(list.fill(1.into()), Ok(()));
    }

    #[test]
    fn test_insert_remove_pop() {
        let list = ints(&[1, 3]);
        list.insert(1, 2.into()).unwrap();
        list.push_back(4.into()).unwrap();
        assert_eq!(list.to_string(), "[1, 2, 3, 4]");
        assert_eq!(list.remove_at(1), Ok(TaggedValue::Int(2)));
        assert_eq!(list.pop_front(), Ok(TaggedValue::Int(1)));
        assert_eq!(list.pop_back(), Ok(TaggedValue::Int(4)));
        assert_eq!(list.to_vec(), vec![TaggedValue::Int(3)]);
        assert_eq!(list.insert(5, 0.into()), Err(ErrorCode::InvalidParameter));
        assert_eq!(list.remove_at(5), Err(ErrorCode::InvalidParameter));
    }

    #[test]
    fn test_set_get_find_fill_clear() {
        let list = ints(&[5, 6, 7]);
        list.set(1, true.into()).unwrap();
        assert_eq!(list.get(1), TaggedValue::Bool(true));
        assert_eq!(list.find(&7.into()), Some(2));
        assert_eq!(list.find(&8.into()), None);
        list.fill(0.5.into()).unwrap();
        assert_eq!(list.to_string(), "[0.5, 0.5, 0.5]");
        list.clear().unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_mutation_while_borrowed_is_refused() {
        let list = ints(&[1]);
        let items = list.items();
        assert_eq!(list.append(2.into()), Err(ErrorCode::Unavailable));
        drop(items);
        assert_eq!(list.append(2.into()), Ok(()));
    }

    #[test]
    fn test_nested_equality() {
        let inner_a = ints(&[1, 2]);
        let inner_b = ints(&[1, 2]);
        let a = SharedList::from_values([TaggedValue::from(inner_a.clone()), 3.into()]);
        let b = SharedList::from_values([TaggedValue::from(inner_b), 3.into()]);
        assert!(a.is_equal(&b));
        inner_a.append(9.into()).unwrap();
        assert!(!a.is_equal(&b));
        assert_eq!(a.to_string(), "[[1, 2, 9], 3]");
    }

    #[test]
    fn test_self_containing_lists() {
        let a = SharedList::new();
        a.append(a.clone().into()).unwrap();
        let b = SharedList::new();
        b.append(b.clone().into()).unwrap();

        assert!(a.is_equal(&a.clone()));
        let sink = Rc::new(CollectingSink::new());
        let equal = with_sink(sink.clone(), || a.is_equal(&b));
        assert!(!equal);
        assert_eq!(sink.len(), 1);
        let shown = a.to_string();
        let depth = MAX_RECURSION_DEPTH + 1;
        assert!(shown.starts_with(&"[".repeat(depth)));
        assert!(shown.ends_with(&format!("[...]{}", "]".repeat(depth))));
        assert_eq!(shown.len(), 2 * depth + "[...]".len());

        // Break the cycles so the data is freed
        a.clear().unwrap();
        b.clear().unwrap();
        assert_eq!(a.handle_count(), 1);
    }

    #[test]
    #[should_panic(expected = "Index error")]
    fn test_get_out_of_range_is_fatal() {
        ints(&[1]).get(1);
    }
}
