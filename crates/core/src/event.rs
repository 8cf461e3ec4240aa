//! Event - ordered listener list
//!
//! An `Event<A>` calls every connected listener with a `&A` when fired.
//! Listeners connected with priority run before the rest (most recent
//! priority listener first).
//!
//! The listeners live in a [`SharedBuffer`]. `fire` takes an O(1) aliased
//! snapshot and walks that, so a listener may connect or disconnect listeners
//! (itself included) while the event is being dispatched. The change applies
//! from the next `fire`, and the write copies the list instead of touching
//! the snapshot being walked.

use crate::buffer::SharedBuffer;
use crate::error::ErrorCode;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Identifies a connected listener for `disconnect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<A: ?Sized> {
    id: ListenerId,
    callback: Rc<dyn Fn(&A)>,
}

impl<A: ?Sized> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Rc::clone(&self.callback),
        }
    }
}

pub struct Event<A: ?Sized = ()> {
    listeners: RefCell<SharedBuffer<Listener<A>>>,
    next_id: Cell<u64>,
}

impl<A: ?Sized> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> Event<A> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(SharedBuffer::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a listener. With `priority` it runs before every listener
    /// connected so far.
    pub fn connect(
        &self,
        callback: impl Fn(&A) + 'static,
        priority: bool,
    ) -> Result<ListenerId, ErrorCode> {
        let id = ListenerId(self.next_id.get());
        let listener = Listener {
            id,
            callback: Rc::new(callback),
        };
        let mut listeners = self.listeners.borrow_mut();
        if priority {
            listeners.push_front(listener)?;
        } else {
            listeners.push_back(listener)?;
        }
        self.next_id.set(id.0 + 1);
        Ok(id)
    }

    /// Remove a listener. `CantFind` if it is not connected.
    pub fn disconnect(&self, id: ListenerId) -> Result<(), ErrorCode> {
        let mut listeners = self.listeners.borrow_mut();
        let Some(index) = listeners.iter().position(|l| l.id == id) else {
            return Err(ErrorCode::CantFind);
        };
        listeners.remove_at(index).map(drop)
    }

    pub fn is_connected(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|l| l.id == id)
    }

    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.listeners.borrow_mut());
        drop(old);
    }

    /// Call every listener, in order, with `args`.
    pub fn fire(&self, args: &A) {
        let snapshot = self.listeners.borrow().clone();
        for listener in &snapshot {
            (listener.callback)(args);
        }
    }
}

impl<A: ?Sized> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_in_connection_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let event: Event<i32> = Event::new();
        for tag in ["a", "b"] {
            let log = log.clone();
            event
                .connect(move |x| log.borrow_mut().push(format!("{}{}", tag, x)), false)
                .unwrap();
        }
        let first = log.clone();
        event
            .connect(move |x| first.borrow_mut().push(format!("!{}", x)), true)
            .unwrap();

        event.fire(&1);
        assert_eq!(*log.borrow(), vec!["!1", "a1", "b1"]);
        assert_eq!(event.len(), 3);
    }

    #[test]
    fn test_disconnect() {
        let hits = Rc::new(Cell::new(0));
        let event: Event = Event::new();
        let counter = hits.clone();
        let id = event.connect(move |_| counter.set(counter.get() + 1), false).unwrap();
        event.fire(&());
        assert!(event.is_connected(id));
        assert_eq!(event.disconnect(id), Ok(()));
        assert_eq!(event.disconnect(id), Err(ErrorCode::CantFind));
        event.fire(&());
        assert_eq!(hits.get(), 1);
        assert!(event.is_empty());
    }

    #[test]
    fn test_listener_can_disconnect_itself() {
        let event: Rc<Event<str>> = Rc::new(Event::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let own_id = Rc::new(Cell::new(None));

        let (ev, ids, log) = (Rc::downgrade(&event), own_id.clone(), seen.clone());
        let id = event
            .connect(
                move |msg: &str| {
                    log.borrow_mut().push(msg.to_string());
                    if let (Some(ev), Some(id)) = (ev.upgrade(), ids.get()) {
                        ev.disconnect(id).unwrap();
                    }
                },
                false,
            )
            .unwrap();
        own_id.set(Some(id));

        let later = seen.clone();
        event
            .connect(move |msg: &str| later.borrow_mut().push(format!("later {}", msg)), false)
            .unwrap();

        event.fire("one");
        event.fire("two");
        assert_eq!(*seen.borrow(), vec!["one", "later one", "later two"]);
        assert_eq!(event.len(), 1);
    }

    #[test]
    fn test_clear() {
        let event: Event<u8> = Event::new();
        event.connect(|_| {}, false).unwrap();
        event.connect(|_| {}, true).unwrap();
        event.clear();
        assert!(event.is_empty());
        assert_eq!(format!("{:?}", event), "Event { listeners: 0 }");
    }
}
