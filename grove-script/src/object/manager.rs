use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;

use crate::object::{LifecycleFn, Object};
use crate::program::pool::ProgramPool;
use crate::renv::RuntimeEnv;
use crate::stack::Stack;
use crate::variant::Handle;

/// The authoritative registry of live objects.
///
/// The manager is the single owner of every object record; everything else
/// refers to objects by handle. Handles are allocated from a monotonically
/// increasing counter (0 is the null handle) and are never reused within a
/// session, so a stale handle misses instead of aliasing a newer object.
///
/// Records sit behind `RefCell` so that a running program can spawn, kill
/// and destroy other objects through a shared manager reference.
pub struct ObjectManager {
    objects: RefCell<HashMap<Handle, Rc<RefCell<Object>>>>,
    next_handle: Cell<u32>,
    root: Cell<Handle>,
    tick: Cell<u64>,
    stack: Rc<RefCell<Stack>>,
    pool: Rc<RefCell<ProgramPool>>,
}

impl ObjectManager {
    pub fn new(stack: Rc<RefCell<Stack>>, pool: Rc<RefCell<ProgramPool>>) -> Self {
        ObjectManager {
            objects: RefCell::new(HashMap::new()),
            next_handle: Cell::new(1),
            root: Cell::new(Handle::NULL),
            tick: Cell::new(0),
            stack,
            pool,
        }
    }

    /// Looks up a live object. A dead or never-allocated handle misses.
    pub fn get(&self, handle: Handle) -> Option<Rc<RefCell<Object>>> {
        self.objects.borrow().get(&handle).cloned()
    }

    pub fn exists(&self, handle: Handle) -> bool {
        self.objects.borrow().contains_key(&handle)
    }

    /// The root of the tree; null until the first spawn seeds it.
    pub fn root(&self) -> Handle {
        self.root.get()
    }

    pub fn count(&self) -> usize {
        self.objects.borrow().len()
    }

    /// A fresh runtime environment for one activation owned by `owner`.
    pub(crate) fn renv_for(&self, owner: Handle) -> RuntimeEnv<'_> {
        RuntimeEnv::new(owner, self.stack.as_ref(), self.pool.as_ref(), self)
    }

    /// Spawns a detached object: allocates its handle, runs `__constructor`
    /// (if bound), then the init callback. A failed init destroys the object
    /// again and returns the null handle. The first spawn seeds the root.
    pub fn spawn(
        &self,
        name: &str,
        user_data: Option<Box<dyn Any>>,
        on_init: Option<LifecycleFn>,
        on_release: Option<LifecycleFn>,
    ) -> Result<Handle> {
        let handle = Handle::from_raw(self.next_handle.get());
        self.next_handle.set(self.next_handle.get() + 1);

        let object = Object::new(name, handle, user_data, on_init, on_release, self.tick.get());
        self.objects
            .borrow_mut()
            .insert(handle, Rc::new(RefCell::new(object)));
        if self.root.get().is_null() {
            self.root.set(handle);
        }
        log::debug!("spawned {} as object {}", name, handle);

        let mut env = self.renv_for(handle);
        env.call(handle, "__constructor", &[])?;

        let on_init = self.get(handle).and_then(|rc| rc.borrow().on_init());
        if let Some(init) = on_init {
            let ok = match self.get(handle) {
                Some(rc) => init(&mut rc.borrow_mut()),
                None => false,
            };
            if !ok {
                self.destroy(handle)?;
                return Ok(Handle::NULL);
            }
        }

        Ok(handle)
    }

    /// Spawns an object and attaches it under `parent`.
    pub fn spawn_child(
        &self,
        parent: Handle,
        name: &str,
        user_data: Option<Box<dyn Any>>,
        on_init: Option<LifecycleFn>,
        on_release: Option<LifecycleFn>,
    ) -> Result<Handle> {
        let child = self.spawn(name, user_data, on_init, on_release)?;
        if child.is_null() {
            return Ok(child);
        }
        if let Some(rc) = self.get(child) {
            rc.borrow_mut().set_parent(parent);
        }
        if let Some(rc) = self.get(parent) {
            rc.borrow_mut().add_child(child);
        }
        Ok(child)
    }

    /// First child of `parent` whose type name matches, in insertion order.
    pub fn find_child(&self, parent: Handle, name: &str) -> Option<Handle> {
        let parent = self.get(parent)?;
        let children = parent.borrow().children().to_vec();
        children
            .into_iter()
            .find(|&c| self.get(c).is_some_and(|rc| rc.borrow().name() == name))
    }

    /// Marks an object for deletion at the next sweep. Idempotent; a dead
    /// handle is a no-op.
    pub fn kill(&self, handle: Handle) {
        if let Some(rc) = self.get(handle) {
            rc.borrow_mut().kill();
        }
    }

    /// Tears an object down immediately: children first (reverse insertion
    /// order), then the release callback and `__destructor`, then the record
    /// itself. The handle is never reissued.
    pub fn destroy(&self, handle: Handle) -> Result<()> {
        let Some(rc) = self.get(handle) else {
            return Ok(());
        };

        let children: Vec<Handle> = rc.borrow().children().iter().rev().copied().collect();
        for child in children {
            self.destroy(child)?;
        }

        let on_release = rc.borrow().on_release();
        if let Some(release) = on_release {
            release(&mut rc.borrow_mut());
        }

        let mut env = self.renv_for(handle);
        env.call(handle, "__destructor", &[])?;

        let parent = rc.borrow().parent();
        if let Some(parent_rc) = self.get(parent) {
            parent_rc.borrow_mut().remove_child(handle);
        }

        self.objects.borrow_mut().remove(&handle);
        if self.root.get() == handle {
            log::debug!("root object {} destroyed, the tree is gone", handle);
            self.root.set(Handle::NULL);
        }
        Ok(())
    }

    /// Pre-order walk from `start`: the visitor sees the node, then its
    /// children in insertion order. The child list (with kill flags) is
    /// snapshotted when the node's visit begins, so structural mutations
    /// made mid-visit don't disturb the walk: a child killed during the
    /// visit is still seen this pass, a child already killed beforehand is
    /// skipped, and deletions only happen at the sweep.
    pub fn traverse_tree<F>(&self, start: Handle, visitor: &mut F) -> Result<()>
    where
        F: FnMut(Handle) -> Result<()>,
    {
        let Some(rc) = self.get(start) else {
            return Ok(());
        };
        if rc.borrow().is_killed() {
            return Ok(());
        }
        self.visit(start, visitor)
    }

    fn visit<F>(&self, handle: Handle, visitor: &mut F) -> Result<()>
    where
        F: FnMut(Handle) -> Result<()>,
    {
        let Some(rc) = self.get(handle) else {
            return Ok(());
        };

        let snapshot: Vec<(Handle, bool)> = rc
            .borrow()
            .children()
            .iter()
            .map(|&c| {
                let skip = self.get(c).map_or(true, |child| child.borrow().is_killed());
                (c, skip)
            })
            .collect();

        visitor(handle)?;

        for (child, skip) in snapshot {
            if !skip {
                self.visit(child, visitor)?;
            }
        }
        Ok(())
    }

    /// Runs one tick over the whole tree: every visited object dispatches
    /// the program bound to `state:<current-state>` under its type name.
    /// Objects spawned during this tick sit the walk out and start at the
    /// next one.
    pub fn update(&self) -> Result<()> {
        self.tick.set(self.tick.get() + 1);
        let tick = self.tick.get();
        let root = self.root.get();

        self.traverse_tree(root, &mut |handle| {
            let Some(rc) = self.get(handle) else {
                return Ok(());
            };
            if rc.borrow().born_tick() == tick {
                return Ok(());
            }
            let state = rc.borrow().state().to_string();
            let mut env = self.renv_for(handle);
            env.call(handle, &format!("state:{}", state), &[])?;
            Ok(())
        })?;

        self.sweep()
    }

    /// Destroys every object whose kill flag is set, children before
    /// parents.
    pub fn sweep(&self) -> Result<()> {
        let killed: Vec<Handle> = self
            .objects
            .borrow()
            .iter()
            .filter(|(_, rc)| rc.borrow().is_killed())
            .map(|(&h, _)| h)
            .collect();

        for handle in killed {
            if self.exists(handle) {
                self.destroy(handle)?;
            }
        }
        Ok(())
    }

    /// Abandons every record without running lifecycle callbacks. Used when
    /// a fatal error aborts the tick and the VM has to go inert.
    pub(crate) fn shutdown(&self) {
        self.objects.borrow_mut().clear();
        self.root.set(Handle::NULL);
    }
}
