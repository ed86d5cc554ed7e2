//! Scene node and structural event dispatch

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::SceneError;
use crate::component::{Component, ComponentHandle};
use crate::data::Store;
use crate::foundation::signal::Signal;

/// Kind of structural mutation carried by a [`SceneEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEventKind {
    /// A child node was linked under `target`
    NodeAdded,
    /// A child node was unlinked from `target`
    NodeRemoved,
    /// A component was attached to `target`
    ComponentAdded,
    /// A component was detached from `target`
    ComponentRemoved,
}

/// Structural mutation event, delivered to the mutation site and every
/// ancestor above it
#[derive(Clone)]
pub struct SceneEvent {
    /// What happened
    pub kind: SceneEventKind,
    /// The node whose children or components changed
    pub target: Node,
    /// The child involved, for node events
    pub child: Option<Node>,
    /// The component involved, for component events
    pub component: Option<ComponentHandle>,
}

impl std::fmt::Debug for SceneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneEvent")
            .field("kind", &self.kind)
            .field("target", &self.target.name())
            .field("child", &self.child.as_ref().map(Node::name))
            .finish()
    }
}

struct NodeShared {
    name: RefCell<String>,
    parent: RefCell<Weak<NodeShared>>,
    children: RefCell<Vec<Node>>,
    components: RefCell<Vec<ComponentHandle>>,
    store: Store,
    observers: Signal<SceneEvent>,
}

/// Shared handle to a scene node
///
/// Children are owned by their parent; the parent link is weak, so dropping
/// every handle to a subtree root drops the subtree.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeShared>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("children", &self.inner.children.borrow().len())
            .field("components", &self.inner.components.borrow().len())
            .finish()
    }
}

impl Node {
    /// Create a detached node with an empty store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(NodeShared {
                name: RefCell::new(name.into()),
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
                components: RefCell::new(Vec::new()),
                store: Store::new(),
                observers: Signal::new(),
            }),
        }
    }

    /// Node name (debugging, error messages)
    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    /// Rename the node
    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.borrow_mut() = name.into();
    }

    /// The aggregated property store visible at this node
    pub fn store(&self) -> Store {
        self.inner.store.clone()
    }

    /// Observer signal receiving this node's own mutations and those of its
    /// whole subtree (events bubble here from below)
    pub fn observers(&self) -> Signal<SceneEvent> {
        self.inner.observers.clone()
    }

    /// Parent node, if attached
    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.borrow().upgrade().map(|inner| Node { inner })
    }

    /// Snapshot of the node's children, in attach order
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.borrow().clone()
    }

    /// The root of the tree this node belongs to (itself when detached)
    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Downgrade to a weak handle
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Link `child` under this node
    ///
    /// A child that already has a parent is relinked (removed from its old
    /// parent first). After linking, every component in the child's subtree
    /// gets its `on_root_changed` hook, then a `NodeAdded` event is
    /// dispatched from this node up to the root. If a hook fails (e.g. a
    /// root-singleton conflict surfaces while re-rooting), the link is
    /// rolled back and the error returned.
    pub fn add_child(&self, child: &Node) -> Result<(), SceneError> {
        if *child == *self || self.ancestors_include(child) {
            return Err(SceneError::WouldCreateCycle {
                parent: self.name(),
                child: child.name(),
            });
        }

        // Pre-check root singletons so a failure leaves both trees intact.
        // A relink within the same tree cannot introduce a duplicate.
        if child.root() != self.root() {
            self.check_singletons_of_subtree(child)?;
        }

        if let Some(previous) = child.parent() {
            previous.remove_child(child)?;
        }

        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
        self.inner.children.borrow_mut().push(child.clone());

        if let Err(error) = notify_root_changed(child) {
            // Roll back the link; the subtree returns to being its own root.
            self.unlink_child(child);
            if let Err(rollback) = notify_root_changed(child) {
                log::error!("rollback of '{}' failed: {rollback}", child.name());
            }
            return Err(error);
        }

        dispatch_from(
            self,
            &SceneEvent {
                kind: SceneEventKind::NodeAdded,
                target: self.clone(),
                child: Some(child.clone()),
                component: None,
            },
        );
        Ok(())
    }

    /// Unlink `child` from this node
    ///
    /// The child's subtree becomes its own tree; its components get
    /// `on_root_changed`, then a `NodeRemoved` event is dispatched from this
    /// node up to the (former) root.
    pub fn remove_child(&self, child: &Node) -> Result<(), SceneError> {
        let is_child = self.inner.children.borrow().iter().any(|c| c == child);
        if !is_child {
            return Err(SceneError::NotAChild {
                parent: self.name(),
                child: child.name(),
            });
        }

        self.unlink_child(child);

        // Detach never fails structurally; a hook error here is a component
        // bug, logged and skipped so the graph stays consistent.
        if let Err(error) = notify_root_changed(child) {
            log::error!(
                "on_root_changed failed while detaching '{}': {error}",
                child.name()
            );
        }

        dispatch_from(
            self,
            &SceneEvent {
                kind: SceneEventKind::NodeRemoved,
                target: self.clone(),
                child: Some(child.clone()),
                component: None,
            },
        );
        Ok(())
    }

    /// Attach a component
    ///
    /// Root-singleton components are rejected if another instance of the
    /// same type is already attached anywhere under this node's root; the
    /// check happens before any state changes, so a failure has no side
    /// effects. The component's `on_attached` hook runs synchronously before
    /// the bubbled `ComponentAdded` event, guaranteeing provider
    /// registration happens before other observers see the structural
    /// change.
    pub fn add_component<C: Component + 'static>(
        &self,
        component: C,
    ) -> Result<ComponentHandle, SceneError> {
        if component.is_root_singleton()
            && subtree_has_component(&self.root(), TypeId::of::<C>())
        {
            return Err(SceneError::DuplicateSingleton {
                type_name: component.type_name(),
            });
        }

        let handle: ComponentHandle = Rc::new(RefCell::new(component));
        self.inner.components.borrow_mut().push(Rc::clone(&handle));

        if let Err(error) = handle.borrow_mut().on_attached(self) {
            self.inner
                .components
                .borrow_mut()
                .retain(|h| !Rc::ptr_eq(h, &handle));
            return Err(error);
        }

        dispatch_from(
            self,
            &SceneEvent {
                kind: SceneEventKind::ComponentAdded,
                target: self.clone(),
                child: None,
                component: Some(Rc::clone(&handle)),
            },
        );
        Ok(handle)
    }

    /// Detach a component previously returned by [`Node::add_component`]
    pub fn remove_component(&self, handle: &ComponentHandle) -> Result<(), SceneError> {
        let position = self
            .inner
            .components
            .borrow()
            .iter()
            .position(|h| Rc::ptr_eq(h, handle));
        let Some(position) = position else {
            return Err(SceneError::ComponentNotAttached { node: self.name() });
        };

        self.inner.components.borrow_mut().remove(position);
        handle.borrow_mut().on_detached(self);

        dispatch_from(
            self,
            &SceneEvent {
                kind: SceneEventKind::ComponentRemoved,
                target: self.clone(),
                child: None,
                component: Some(Rc::clone(handle)),
            },
        );
        Ok(())
    }

    /// Snapshot of attached components, in attach order
    pub fn components(&self) -> Vec<ComponentHandle> {
        self.inner.components.borrow().clone()
    }

    /// Run `f` against the first attached component of concrete type `T`
    pub fn with_component<T: Component + 'static, R>(
        &self,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        for handle in self.components() {
            if let Ok(guard) = handle.try_borrow() {
                if let Some(component) = guard.as_any().downcast_ref::<T>() {
                    return Some(f(component));
                }
            }
        }
        None
    }

    /// Whether a component of concrete type `T` is attached
    pub fn has_component<T: Component + 'static>(&self) -> bool {
        self.with_component::<T, ()>(|_| ()).is_some()
    }

    fn ancestors_include(&self, node: &Node) -> bool {
        let mut current = self.parent();
        while let Some(ancestor) = current {
            if ancestor == *node {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    fn unlink_child(&self, child: &Node) {
        *child.inner.parent.borrow_mut() = Weak::new();
        self.inner.children.borrow_mut().retain(|c| c != child);
    }

    /// Reject the link if the incoming subtree carries a root singleton that
    /// already exists under this node's root.
    fn check_singletons_of_subtree(&self, subtree: &Node) -> Result<(), SceneError> {
        let root = self.root();
        let mut result = Ok(());
        visit_subtree(subtree, &mut |node| {
            if result.is_err() {
                return;
            }
            for handle in node.components() {
                let guard = match handle.try_borrow() {
                    Ok(guard) => guard,
                    Err(_) => continue,
                };
                if guard.is_root_singleton()
                    && subtree_has_component(&root, guard.as_any().type_id())
                {
                    result = Err(SceneError::DuplicateSingleton {
                        type_name: guard.type_name(),
                    });
                    return;
                }
            }
        });
        result
    }
}

/// Weak counterpart of [`Node`]
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeShared>,
}

impl WeakNode {
    /// A weak handle pointing nowhere
    pub fn empty() -> Self {
        Self { inner: Weak::new() }
    }

    /// Try to recover a strong handle
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl std::fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakNode")
    }
}

/// Walk the event up from the mutation site to the root, mutation site
/// first.
fn dispatch_from(origin: &Node, event: &SceneEvent) {
    let mut current = Some(origin.clone());
    while let Some(node) = current {
        node.inner.observers.emit(event);
        current = node.parent();
    }
}

/// Depth-first pre-order visit.
fn visit_subtree(node: &Node, f: &mut impl FnMut(&Node)) {
    f(node);
    for child in node.children() {
        visit_subtree(&child, f);
    }
}

/// Run `on_root_changed` for every component in the subtree, depth-first.
fn notify_root_changed(subtree: &Node) -> Result<(), SceneError> {
    for handle in subtree.components() {
        handle.borrow_mut().on_root_changed(subtree)?;
    }
    for child in subtree.children() {
        notify_root_changed(&child)?;
    }
    Ok(())
}

/// Whether any component in the subtree has the given concrete type.
fn subtree_has_component(root: &Node, type_id: TypeId) -> bool {
    let mut found = false;
    visit_subtree(root, &mut |node| {
        if found {
            return;
        }
        for handle in node.components() {
            if let Ok(guard) = handle.try_borrow() {
                if guard.as_any().type_id() == type_id {
                    found = true;
                    return;
                }
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct Probe {
        attach_count: Rc<RefCell<u32>>,
    }

    impl Component for Probe {
        fn type_name(&self) -> &'static str {
            "Probe"
        }

        fn on_attached(&mut self, _node: &Node) -> Result<(), SceneError> {
            *self.attach_count.borrow_mut() += 1;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Unique;

    impl Component for Unique {
        fn type_name(&self) -> &'static str {
            "Unique"
        }

        fn is_root_singleton(&self) -> bool {
            true
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_root_follows_parent_links() {
        let root = Node::new("root");
        let mid = Node::new("mid");
        let leaf = Node::new("leaf");
        root.add_child(&mid).unwrap();
        mid.add_child(&leaf).unwrap();

        assert_eq!(leaf.root(), root);
        assert_eq!(leaf.parent().unwrap(), mid);
        assert_eq!(root.root(), root);
    }

    #[test]
    fn test_events_bubble_to_every_ancestor() {
        let root = Node::new("root");
        let mid = Node::new("mid");
        root.add_child(&mid).unwrap();

        let seen: Rc<RefCell<Vec<SceneEventKind>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _slot = root
            .observers()
            .connect(move |e: &SceneEvent| sink.borrow_mut().push(e.kind));

        let leaf = Node::new("leaf");
        mid.add_child(&leaf).unwrap();
        let count = Rc::new(RefCell::new(0));
        let handle = leaf.add_component(Probe {
            attach_count: count,
        });
        let handle = handle.unwrap();
        leaf.remove_component(&handle).unwrap();
        mid.remove_child(&leaf).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                SceneEventKind::NodeAdded,
                SceneEventKind::ComponentAdded,
                SceneEventKind::ComponentRemoved,
                SceneEventKind::NodeRemoved,
            ]
        );
    }

    #[test]
    fn test_hook_runs_before_bubbled_signal() {
        let root = Node::new("root");
        let count = Rc::new(RefCell::new(0));

        let observed_count = Rc::new(RefCell::new(0));
        let count_ref = Rc::clone(&count);
        let observed = Rc::clone(&observed_count);
        let _slot = root.observers().connect(move |e: &SceneEvent| {
            if e.kind == SceneEventKind::ComponentAdded {
                *observed.borrow_mut() = *count_ref.borrow();
            }
        });

        root.add_component(Probe {
            attach_count: Rc::clone(&count),
        })
        .unwrap();

        // The attach hook had already run when the observer fired.
        assert_eq!(*observed_count.borrow(), 1);
    }

    #[test]
    fn test_singleton_rejected_with_state_unchanged() {
        let root = Node::new("root");
        let branch = Node::new("branch");
        root.add_child(&branch).unwrap();

        root.add_component(Unique).unwrap();
        // Component handles carry no Debug; drop the Ok side before unwrapping.
        let err = branch.add_component(Unique).map(|_| ()).unwrap_err();
        assert_eq!(
            err,
            SceneError::DuplicateSingleton {
                type_name: "Unique"
            }
        );
        assert_eq!(branch.components().len(), 0);
        assert_eq!(root.components().len(), 1);
    }

    #[test]
    fn test_merging_trees_checks_singletons() {
        let root = Node::new("root");
        root.add_component(Unique).unwrap();

        let orphan = Node::new("orphan");
        orphan.add_component(Unique).unwrap();

        let err = root.add_child(&orphan).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateSingleton { .. }));
        assert!(orphan.parent().is_none());
        assert_eq!(root.children().len(), 0);
    }

    #[test]
    fn test_cycle_rejected() {
        let a = Node::new("a");
        let b = Node::new("b");
        a.add_child(&b).unwrap();
        assert!(matches!(
            b.add_child(&a),
            Err(SceneError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            a.add_child(&a),
            Err(SceneError::WouldCreateCycle { .. })
        ));
    }

    #[test]
    fn test_relink_moves_between_parents() {
        let first = Node::new("first");
        let second = Node::new("second");
        let child = Node::new("child");

        first.add_child(&child).unwrap();
        second.add_child(&child).unwrap();

        assert_eq!(first.children().len(), 0);
        assert_eq!(child.parent().unwrap(), second);
    }
}
