//! Named, pathed owned object

use crate::object::{ObjectHeader, OwnedObject};
use crate::text::Text;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// An [`OwnedObject`] carrying a name and a source path.
///
/// Setters take `&self` so they work through shared handles.
#[derive(Default)]
pub struct Resource {
    header: ObjectHeader,
    name: RwLock<Text>,
    path: RwLock<Text>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(name: impl Into<Text>, path: impl Into<Text>) -> Self {
        Self {
            header: ObjectHeader::new(),
            name: RwLock::new(name.into()),
            path: RwLock::new(path.into()),
        }
    }

    pub fn name(&self) -> Text {
        self.name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_name(&self, name: impl Into<Text>) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    pub fn path(&self) -> Text {
        self.path.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_path(&self, path: impl Into<Text>) {
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = path.into();
    }
}

impl OwnedObject for Resource {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn class_name(&self) -> &'static str {
        "Resource"
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name())
            .field("path", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Handle;

    #[test]
    fn test_name_and_path() {
        let res = Resource::with_name("grass", "textures/grass.png");
        assert_eq!(res.name(), "grass");
        assert_eq!(res.path(), "textures/grass.png");
        assert_eq!(res.class_name(), "Resource");
        assert_eq!(res.parent_class_name(), "OwnedObject");
        assert!(Resource::new().name().is_empty());
    }

    #[test]
    fn test_setters_through_shared_handles() {
        let a = Handle::new(Resource::new());
        let b = a.clone();
        b.set_name("stone");
        b.set_path(String::from("textures/stone.png"));
        assert_eq!(a.name(), "stone");
        assert_eq!(a.path(), "textures/stone.png");
        assert_eq!(
            format!("{:?}", *a),
            "Resource { name: \"stone\", path: \"textures/stone.png\" }"
        );
    }

    #[test]
    fn test_shared_across_threads() {
        let res = Handle::new(Resource::with_name("shared", ""));
        let worker = {
            let res = res.clone();
            std::thread::spawn(move || {
                res.set_path("from/thread");
                res.name().length()
            })
        };
        assert_eq!(worker.join().unwrap(), 6);
        assert_eq!(res.path(), "from/thread");
        assert_eq!(res.refcount(), 1);
    }

    #[test]
    fn test_dyn_handle_finds_resource() {
        let any = Handle::new(Resource::with_name("x", "y")).into_dyn();
        assert!(any.is_class("Resource"));
        let res = any.downcast::<Resource>().unwrap();
        assert_eq!(res.path(), "y");
    }
}
