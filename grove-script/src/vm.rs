use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::builtins;
use crate::object::manager::ObjectManager;
use crate::object::{LifecycleFn, Object};
use crate::program::pool::ProgramPool;
use crate::program::Program;
use crate::renv::RuntimeEnv;
use crate::stack::Stack;
use crate::variant::{Handle, Variant};

/// Type name of the root object spawned by [`Vm::launch`].
pub const ROOT_OBJECT_NAME: &str = "Application";

/// The embedder-facing virtual machine: one stack, one program pool, one
/// object manager, and the tick driver that walks the tree.
///
/// Everything is single-threaded and cooperative: programs run to
/// completion, the only suspension points are tick boundaries, and a fatal
/// program-integrity error aborts the tick and leaves the VM inactive.
pub struct Vm {
    stack: Rc<RefCell<Stack>>,
    pool: Rc<RefCell<ProgramPool>>,
    manager: ObjectManager,
}

impl Vm {
    /// Creates a VM with the built-in object types already registered.
    pub fn new() -> Result<Self> {
        let stack = Rc::new(RefCell::new(Stack::new()));
        let pool = Rc::new(RefCell::new(ProgramPool::new()));
        let manager = ObjectManager::new(stack.clone(), pool.clone());
        let vm = Vm { stack, pool, manager };
        builtins::register_all(&vm)?;
        Ok(vm)
    }

    /// Boots the VM by spawning the root object.
    pub fn launch(&self) -> Result<Handle> {
        self.manager.spawn(ROOT_OBJECT_NAME, None, None, None)
    }

    /// True iff the root object exists.
    pub fn is_active(&self) -> bool {
        self.manager.exists(self.manager.root())
    }

    /// Runs one tick: the pre-order tree walk, then the sweep of killed
    /// objects. Returns whether the VM is still active afterwards. A fatal
    /// error is logged with its object/method context and deactivates the
    /// VM.
    pub fn update(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        if let Err(e) = self.manager.update() {
            log::error!("fatal runtime error, stopping the vm: {:#}", e);
            self.manager.shutdown();
            return false;
        }
        self.is_active()
    }

    /// Marks the root for destruction; the VM goes inactive at the next
    /// sweep.
    pub fn kill(&self) {
        self.manager.kill(self.manager.root());
    }

    /// Spawns an object of type `name` under `parent`. `user_data` and the
    /// lifecycle callbacks may be absent; a failed init yields the null
    /// handle.
    pub fn spawn_object(
        &self,
        parent: Handle,
        name: &str,
        user_data: Option<Box<dyn Any>>,
        on_init: Option<LifecycleFn>,
        on_release: Option<LifecycleFn>,
    ) -> Result<Handle> {
        self.manager
            .spawn_child(parent, name, user_data, on_init, on_release)
    }

    /// Registers a native method under (object-name, method-name).
    /// Registering the same pair twice is the duplicate-definition error.
    pub fn bind<F>(&self, object: &str, method: &str, arity: u8, f: F) -> Result<()>
    where
        F: Fn(&mut RuntimeEnv, &[Variant]) -> Result<Option<Variant>> + 'static,
    {
        self.insert_program(object, method, Program::native(arity, Box::new(f)))
    }

    /// Inserts a compiler-emitted (or hand-built) program into the pool.
    pub fn insert_program(&self, object: &str, method: &str, program: Program) -> Result<()> {
        self.pool.borrow_mut().put(object, method, program)?;
        Ok(())
    }

    /// Calls a method on a live object from the host. Method-not-found and
    /// dead handles produce nil, as they do for script-level dispatch.
    pub fn call(&self, target: Handle, method: &str, args: &[Variant]) -> Result<Variant> {
        let mut env = self.manager.renv_for(target);
        env.call(target, method, args)
    }

    pub fn stack(&self) -> &RefCell<Stack> {
        &self.stack
    }

    pub fn pool(&self) -> &RefCell<ProgramPool> {
        &self.pool
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.manager
    }

    pub fn root(&self) -> Handle {
        self.manager.root()
    }

    pub fn root_object(&self) -> Option<Rc<RefCell<Object>>> {
        self.manager.get(self.manager.root())
    }
}
