//! Plugins loaded from shared objects.
//!
//! A plugin module exports two symbols: `create`, returning an opaque pointer to a new
//! instance, and `destroy`, releasing one. [`declare_plugin!`](crate::declare_plugin) emits
//! both for a type implementing [`Plugin`]. The pointer refers to a `Box<dyn Plugin>`, so the
//! module must be built with the same compiler and the same version of this crate as the host.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use super::{Plugin, PluginContext};
use crate::trace::{CollOpInfo, FuncEventInfo, P2PInfo};

pub const CREATE_SYMBOL: &[u8] = b"create";
pub const DESTROY_SYMBOL: &[u8] = b"destroy";

/// Factory exported by a plugin module.
pub type CreateFn = unsafe extern "C" fn() -> *mut c_void;
/// Destructor exported by a plugin module.
pub type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Export `create` and `destroy` entry points for a plugin type.
///
/// The one-argument form constructs the plugin with `Default`.
///
/// ```ignore
/// #[derive(Default)]
/// struct Stretch;
/// impl tracesim::framework::Plugin for Stretch { /* ... */ }
/// tracesim::declare_plugin!(Stretch);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin:ty) => {
        $crate::declare_plugin!($plugin, <$plugin as ::std::default::Default>::default());
    };
    ($plugin:ty, $ctor:expr) => {
        #[no_mangle]
        pub extern "C" fn create() -> *mut ::std::ffi::c_void {
            let plugin: ::std::boxed::Box<dyn $crate::framework::Plugin> =
                ::std::boxed::Box::new($ctor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(plugin)) as *mut ::std::ffi::c_void
        }

        /// # Safety
        ///
        /// `plugin` must come from `create` in this module and not have been destroyed.
        #[no_mangle]
        pub unsafe extern "C" fn destroy(plugin: *mut ::std::ffi::c_void) {
            if !plugin.is_null() {
                drop(unsafe {
                    ::std::boxed::Box::from_raw(
                        plugin as *mut ::std::boxed::Box<dyn $crate::framework::Plugin>,
                    )
                });
            }
        }
    };
}

/// A plugin instance created by a module's factory.
///
/// Dropping it calls the module's destructor and then unloads the module.
pub struct PluginLibrary {
    instance: *mut c_void,
    destroy: DestroyFn,
    path: Option<PathBuf>,
    /// Keep the library loaded while the instance and function pointers are in use.
    _lib: Option<libloading::Library>,
}

impl PluginLibrary {
    /// Load the module at `path` and create one plugin instance from it.
    pub fn open(path: &Path) -> Result<Self> {
        // SAFETY: loading runs the module's initializers; plugin modules are trusted code.
        let lib = unsafe { libloading::Library::new(path) }
            .with_context(|| format!("Failed to load plugin module {}", path.display()))?;

        let (create, destroy) = unsafe {
            let create: libloading::Symbol<CreateFn> = lib
                .get(CREATE_SYMBOL)
                .with_context(|| format!("{} does not export create", path.display()))?;
            let destroy: libloading::Symbol<DestroyFn> = lib
                .get(DESTROY_SYMBOL)
                .with_context(|| format!("{} does not export destroy", path.display()))?;
            // Copy the pointers out; they stay valid as long as _lib lives.
            (*create, *destroy)
        };

        // SAFETY: the symbols were exported by declare_plugin! with these signatures.
        let mut plugin = unsafe { Self::from_entry_points(create, destroy)? };
        plugin.path = Some(path.to_path_buf());
        plugin._lib = Some(lib);
        info!("Loaded plugin module {}", path.display());
        Ok(plugin)
    }

    /// Create an instance through entry points already resolved by the caller, such as the
    /// ones [`declare_plugin!`](crate::declare_plugin) generates inside this process.
    ///
    /// # Safety
    ///
    /// `create` must return a pointer that `destroy` accepts, pointing at a `Box<dyn Plugin>`,
    /// and both functions must stay valid for the lifetime of the returned value.
    pub unsafe fn from_entry_points(create: CreateFn, destroy: DestroyFn) -> Result<Self> {
        let instance = unsafe { create() };
        if instance.is_null() {
            bail!("Plugin factory returned a null instance");
        }
        Ok(Self {
            instance,
            destroy,
            path: None,
            _lib: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn plugin(&mut self) -> &mut dyn Plugin {
        // SAFETY: instance is a live Box<dyn Plugin> owned by self until drop.
        unsafe { &mut **(self.instance as *mut Box<dyn Plugin>) }
    }
}

impl Drop for PluginLibrary {
    fn drop(&mut self) {
        // SAFETY: instance came from the matching create and is destroyed exactly once, before
        // _lib is dropped.
        unsafe { (self.destroy)(self.instance) };
        debug!("Destroyed plugin instance");
    }
}

impl Plugin for PluginLibrary {
    fn initialize(&mut self, ctx: &PluginContext) {
        self.plugin().initialize(ctx)
    }

    fn finalize(&mut self, ctx: &PluginContext) {
        self.plugin().finalize(ctx)
    }

    fn process_function_event(&mut self, ctx: &PluginContext, event: &mut FuncEventInfo) {
        self.plugin().process_function_event(ctx, event)
    }

    fn process_non_tracing_event(&mut self, ctx: &PluginContext, event: &mut FuncEventInfo) {
        self.plugin().process_non_tracing_event(ctx, event)
    }

    fn process_mpi_function_event(&mut self, ctx: &PluginContext, event: &mut FuncEventInfo) {
        self.plugin().process_mpi_function_event(ctx, event)
    }

    fn process_coll_op(&mut self, ctx: &PluginContext, coll_op: &mut CollOpInfo) {
        self.plugin().process_coll_op(ctx, coll_op)
    }

    fn process_p2p(&mut self, ctx: &PluginContext, message: &mut P2PInfo) {
        self.plugin().process_p2p(ctx, message)
    }

    fn process_nonblocking_send(
        &mut self,
        ctx: &PluginContext,
        event: &mut FuncEventInfo,
        message: &mut P2PInfo,
    ) {
        self.plugin().process_nonblocking_send(ctx, event, message)
    }

    fn process_p2p_wait_all_some(&mut self, ctx: &PluginContext, messages: &mut [P2PInfo]) {
        self.plugin().process_p2p_wait_all_some(ctx, messages)
    }

    fn try_initialize(&mut self, ctx: &PluginContext) -> Result<()> {
        self.plugin().try_initialize(ctx)
    }

    fn try_finalize(&mut self, ctx: &PluginContext) -> Result<()> {
        self.plugin().try_finalize(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static LIVE: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Counted {
        fn new() -> Self {
            LIVE.fetch_add(1, Ordering::SeqCst);
            Counted
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            LIVE.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Plugin for Counted {
        fn initialize(&mut self, _ctx: &PluginContext) {}
        fn finalize(&mut self, _ctx: &PluginContext) {}
        fn process_function_event(&mut self, _ctx: &PluginContext, event: &mut FuncEventInfo) {
            event.set_end_time(event.end_time() * 3);
        }
        fn process_non_tracing_event(&mut self, _ctx: &PluginContext, _event: &mut FuncEventInfo) {}
        fn process_mpi_function_event(
            &mut self,
            _ctx: &PluginContext,
            _event: &mut FuncEventInfo,
        ) {
        }
        fn process_coll_op(&mut self, _ctx: &PluginContext, _coll_op: &mut CollOpInfo) {}
        fn process_p2p(&mut self, _ctx: &PluginContext, _message: &mut P2PInfo) {}
        fn process_nonblocking_send(
            &mut self,
            _ctx: &PluginContext,
            _event: &mut FuncEventInfo,
            _message: &mut P2PInfo,
        ) {
        }
        fn process_p2p_wait_all_some(&mut self, _ctx: &PluginContext, _messages: &mut [P2PInfo]) {}
    }

    mod module {
        use super::Counted;
        crate::declare_plugin!(Counted, Counted::new());
    }

    unsafe extern "C" fn null_create() -> *mut c_void {
        std::ptr::null_mut()
    }

    #[test]
    fn test_declared_entry_points() {
        let ctx = PluginContext::new();
        let mut plugin =
            unsafe { PluginLibrary::from_entry_points(module::create, module::destroy) }.unwrap();
        assert_eq!(LIVE.load(Ordering::SeqCst), 1);
        assert!(plugin.path().is_none());

        let mut event = FuncEventInfo::new(0, 1, 0, 0, 0, 5);
        plugin.process_function_event(&ctx, &mut event);
        assert_eq!(event.end_time(), 15);
        plugin.try_initialize(&ctx).unwrap();

        drop(plugin);
        assert_eq!(LIVE.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_null_instance_is_an_error() {
        let err = unsafe { PluginLibrary::from_entry_points(null_create, module::destroy) }
            .err()
            .unwrap();
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn test_open_missing_module() {
        let err = PluginLibrary::open(Path::new("/nonexistent/libplugin.so"))
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("Failed to load plugin module"));
    }
}
