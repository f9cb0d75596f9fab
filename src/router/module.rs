//! Handler Module Registry and the declarative capability table.
//!
//! A handler module describes itself once — namespace, commands, button
//! listeners, an optional message subscriber — and the router builds the
//! command schema and dispatch tables from that description. Each
//! declaration carries its parameter list so the schema builder can validate
//! the calling convention before anything is published.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use crate::client::ClientHandle;

use super::model::{ButtonContext, CommandContext, MessageContext, TenantId};
use super::options::Args;
use super::reply::HandlerStream;

// ── Handler shapes ────────────────────────────────────────────────────────────

pub type CommandHandler = Arc<dyn Fn(CommandContext, Args) -> HandlerStream + Send + Sync>;
pub type ButtonHandler = Arc<dyn Fn(ButtonContext) -> HandlerStream + Send + Sync>;
pub type MessageHandler = Arc<dyn Fn(MessageContext) -> HandlerStream + Send + Sync>;

// ── Parameters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Command,
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMeta {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// One declared parameter of a handler method, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Context(ContextKind),
    Value {
        type_id: TypeId,
        type_name: &'static str,
        /// `None` for a parameter declared without option metadata.
        option: Option<OptionMeta>,
    },
}

impl Param {
    pub fn command_context() -> Self {
        Self::Context(ContextKind::Command)
    }

    pub fn button_context() -> Self {
        Self::Context(ContextKind::Button)
    }

    /// A required option of type `T`.
    pub fn option<T: 'static>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Value {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            option: Some(OptionMeta {
                name: name.into(),
                description: description.into(),
                required: true,
            }),
        }
    }

    /// A value parameter with no option metadata. Rejected by the schema
    /// builder; exists so modules can be checked against that rule.
    pub fn untagged<T: 'static>() -> Self {
        Self::Value { type_id: TypeId::of::<T>(), type_name: type_name::<T>(), option: None }
    }

    pub fn optional(mut self) -> Self {
        if let Self::Value { option: Some(meta), .. } = &mut self {
            meta.required = false;
        }
        self
    }
}

// ── Declarations ──────────────────────────────────────────────────────────────

/// A command-tagged method.
#[derive(Clone)]
pub struct CommandDecl {
    pub method: &'static str,
    /// Explicit sub-command name; defaults to `method`.
    pub name: Option<String>,
    pub description: String,
    pub params: Vec<Param>,
    pub handler: CommandHandler,
}

impl CommandDecl {
    pub fn new<F>(method: &'static str, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext, Args) -> HandlerStream + Send + Sync + 'static,
    {
        Self {
            method,
            name: None,
            description: description.into(),
            params: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn sub_command_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.method)
    }
}

impl fmt::Debug for CommandDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDecl")
            .field("method", &self.method)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A button-listener method, matched by opaque-id prefix.
#[derive(Clone)]
pub struct ButtonDecl {
    pub method: &'static str,
    pub prefix: String,
    pub params: Vec<Param>,
    pub handler: ButtonHandler,
}

impl ButtonDecl {
    pub fn new<F>(method: &'static str, prefix: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ButtonContext) -> HandlerStream + Send + Sync + 'static,
    {
        Self { method, prefix: prefix.into(), params: Vec::new(), handler: Arc::new(handler) }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

impl fmt::Debug for ButtonDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonDecl")
            .field("method", &self.method)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Everything a module instance offers to the router.
#[derive(Default)]
pub struct Capabilities {
    pub commands: Vec<CommandDecl>,
    pub buttons: Vec<ButtonDecl>,
    pub messages: Option<MessageHandler>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, decl: CommandDecl) -> Self {
        self.commands.push(decl);
        self
    }

    pub fn button(mut self, decl: ButtonDecl) -> Self {
        self.buttons.push(decl);
        self
    }

    pub fn subscribe<F>(mut self, handler: F) -> Self
    where
        F: Fn(MessageContext) -> HandlerStream + Send + Sync + 'static,
    {
        self.messages = Some(Arc::new(handler));
        self
    }

    /// Append the declarations of a shared parent component after this
    /// module's own. The module's message subscriber, if any, wins.
    pub fn inherit(mut self, parent: Capabilities) -> Self {
        self.commands.extend(parent.commands);
        self.buttons.extend(parent.buttons);
        if self.messages.is_none() {
            self.messages = parent.messages;
        }
        self
    }
}

// ── Modules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub description: String,
}

impl Namespace {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into() }
    }
}

/// A tenant-scoped handler instance.
pub trait HandlerModule: Send + Sync + 'static {
    fn namespace(&self) -> Namespace;

    /// Declarations whose handlers are bound to this instance.
    fn capabilities(self: Arc<Self>) -> Capabilities;
}

type ModuleFactory = dyn Fn(TenantId, Arc<dyn ClientHandle>) -> Arc<dyn HandlerModule> + Send + Sync;

/// Capability type + factory. Created at bootstrap, shared read-only.
#[derive(Clone)]
pub struct ModuleSpec {
    kind: &'static str,
    factory: Arc<ModuleFactory>,
}

impl ModuleSpec {
    pub fn of<M, F>(factory: F) -> Self
    where
        M: HandlerModule,
        F: Fn(TenantId, Arc<dyn ClientHandle>) -> M + Send + Sync + 'static,
    {
        let full = type_name::<M>();
        let kind = full.rsplit("::").next().unwrap_or(full);
        Self {
            kind,
            factory: Arc::new(move |tenant, client| Arc::new(factory(tenant, client)) as Arc<dyn HandlerModule>),
        }
    }

    /// Short type name of the module, used in build errors and logs.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn instantiate(&self, tenant: TenantId, client: Arc<dyn ClientHandle>) -> Arc<dyn HandlerModule> {
        (self.factory)(tenant, client)
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Ordered module list supplied by the bootstrapper.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    specs: Vec<ModuleSpec>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ModuleSpec) -> &mut Self {
        self.specs.push(spec);
        self
    }

    pub fn with(mut self, spec: ModuleSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
