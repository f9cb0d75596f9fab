//! Schema Builder — turns a module registry into the external command schema
//! plus the internal dispatch tables for one tenant.
//!
//! Fail-fast: the first rule violation aborts the build and nothing is
//! returned. The only side effect is instantiating the handler modules.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientHandle;

use super::button::{ButtonBinding, ButtonDispatcher};
use super::command::{CommandDispatcher, SubCommandBinding};
use super::error::SchemaBuildError;
use super::model::TenantId;
use super::module::{
    ButtonDecl, CommandDecl, ContextKind, HandlerModule, MessageHandler, ModuleRegistry, Param,
};
use super::options::{OptionType, OptionTypeEntry, OptionTypeRegistry};

const MAX_NAME_LEN: usize = 32;
const MAX_DESCRIPTION_LEN: usize = 100;

// ── Wire schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSchema {
    pub name: String,
    pub description: String,
    pub subcommands: Vec<SubCommandSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCommandSchema {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub required: bool,
}

/// Everything registered with the platform for one tenant.
pub type CommandSchema = Vec<NamespaceSchema>;

// ── Internal bindings ─────────────────────────────────────────────────────────

/// One marshaled argument of a sub-command, in positional order.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
    /// Index in the handler's `Args` (context excluded).
    pub position: usize,
    pub entry: OptionTypeEntry,
}

impl ArgumentSpec {
    pub fn option_type(&self) -> OptionType {
        self.entry.option_type
    }

    fn to_schema(&self) -> OptionSchema {
        OptionSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            option_type: self.option_type(),
            required: self.required,
        }
    }
}

/// A module's ambient-message subscriber.
#[derive(Clone)]
pub struct MessageSubscriber {
    pub module: &'static str,
    pub handler: MessageHandler,
    pub instance: Arc<dyn HandlerModule>,
}

/// One complete, immutable build: swapped into a partition as a unit.
pub struct Bindings {
    pub schema: CommandSchema,
    pub commands: HashMap<String, CommandDispatcher>,
    pub buttons: ButtonDispatcher,
    pub subscribers: Vec<MessageSubscriber>,
}

impl Bindings {
    pub fn sub_command_count(&self) -> usize {
        self.schema.iter().map(|ns| ns.subcommands.len()).sum()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct SchemaBuilder<'a> {
    options: &'a OptionTypeRegistry,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(options: &'a OptionTypeRegistry) -> Self {
        Self { options }
    }

    pub fn build(
        &self,
        modules: &ModuleRegistry,
        tenant: TenantId,
        client: &Arc<dyn ClientHandle>,
    ) -> Result<Bindings, SchemaBuildError> {
        let mut schema = CommandSchema::new();
        let mut commands = HashMap::new();
        let mut buttons = ButtonDispatcher::default();
        let mut subscribers = Vec::new();
        let mut owners: HashMap<String, &'static str> = HashMap::new();

        for spec in modules.iter() {
            let kind = spec.kind();
            let instance = spec.instantiate(tenant, client.clone());
            let namespace = instance.namespace();
            check_name(kind, "namespace", &namespace.name)?;
            check_description(kind, "namespace", &namespace.description)?;
            if let Some(first) = owners.insert(namespace.name.clone(), kind) {
                return Err(SchemaBuildError::DuplicateNamespace {
                    namespace: namespace.name,
                    first: first.to_string(),
                    second: kind.to_string(),
                });
            }

            let caps = instance.clone().capabilities();
            let mut dispatcher = CommandDispatcher::new(&namespace.name);
            let mut subcommands = Vec::with_capacity(caps.commands.len());
            for decl in caps.commands {
                let binding = self.bind_command(kind, decl, &instance)?;
                subcommands.push(SubCommandSchema {
                    name: binding.name.clone(),
                    description: binding.description.clone(),
                    options: binding.args.iter().map(ArgumentSpec::to_schema).collect(),
                });
                if let Some(rejected) = dispatcher.try_insert(binding) {
                    return Err(SchemaBuildError::DuplicateSubCommand {
                        namespace: namespace.name,
                        name: rejected.name,
                        method: rejected.method,
                    });
                }
            }

            for decl in caps.buttons {
                buttons.push(bind_button(kind, decl, &instance)?);
            }

            if let Some(handler) = caps.messages {
                subscribers.push(MessageSubscriber { module: kind, handler, instance: instance.clone() });
            }

            debug!(%tenant, module = kind, namespace = %namespace.name, subcommands = subcommands.len(), "module bound");
            if subcommands.is_empty() {
                continue;
            }
            commands.insert(namespace.name.clone(), dispatcher);
            schema.push(NamespaceSchema {
                name: namespace.name,
                description: namespace.description,
                subcommands,
            });
        }

        Ok(Bindings { schema, commands, buttons, subscribers })
    }

    fn bind_command(
        &self,
        kind: &'static str,
        decl: CommandDecl,
        instance: &Arc<dyn HandlerModule>,
    ) -> Result<SubCommandBinding, SchemaBuildError> {
        let method = format!("{kind}::{}", decl.method);
        let mut params = decl.params.iter();
        if params.next() != Some(&Param::Context(ContextKind::Command)) {
            return Err(SchemaBuildError::MissingContext { method });
        }

        let mut args = Vec::with_capacity(decl.params.len().saturating_sub(1));
        let mut seen = HashSet::new();
        for (index, param) in params.enumerate() {
            let (type_id, type_name, meta) = match param {
                Param::Value { type_id, type_name, option: Some(meta) } => (type_id, type_name, meta),
                _ => {
                    return Err(SchemaBuildError::MissingOptionMetadata {
                        method,
                        position: index + 1,
                    });
                }
            };
            let entry = self.options.lookup(*type_id).ok_or_else(|| {
                SchemaBuildError::UnsupportedOptionType {
                    method: method.clone(),
                    option: meta.name.clone(),
                    type_name: *type_name,
                }
            })?;
            check_name(&method, "option", &meta.name)?;
            check_description(&method, "option", &meta.description)?;
            if !seen.insert(meta.name.as_str()) {
                return Err(SchemaBuildError::DuplicateOption { method, option: meta.name.clone() });
            }
            args.push(ArgumentSpec {
                name: meta.name.clone(),
                description: meta.description.clone(),
                required: meta.required,
                position: index,
                entry: entry.clone(),
            });
        }

        let name = decl.sub_command_name().to_string();
        check_name(&method, "sub-command", &name)?;
        check_description(&method, "sub-command", &decl.description)?;

        Ok(SubCommandBinding {
            name,
            description: decl.description,
            args,
            method,
            handler: decl.handler,
            instance: instance.clone(),
        })
    }
}

fn bind_button(
    kind: &'static str,
    decl: ButtonDecl,
    instance: &Arc<dyn HandlerModule>,
) -> Result<ButtonBinding, SchemaBuildError> {
    let method = format!("{kind}::{}", decl.method);
    if decl.params != [Param::Context(ContextKind::Button)] {
        return Err(SchemaBuildError::InvalidButtonListener { method });
    }
    if decl.prefix.is_empty() {
        return Err(SchemaBuildError::EmptyButtonPrefix { method });
    }
    Ok(ButtonBinding { prefix: decl.prefix, method, handler: decl.handler, instance: instance.clone() })
}

fn check_name(owner: &str, what: &'static str, name: &str) -> Result<(), SchemaBuildError> {
    let valid = (1..=MAX_NAME_LEN).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(SchemaBuildError::InvalidName { owner: owner.to_string(), what, name: name.to_string() })
    }
}

fn check_description(owner: &str, what: &'static str, description: &str) -> Result<(), SchemaBuildError> {
    if (1..=MAX_DESCRIPTION_LEN).contains(&description.chars().count()) {
        Ok(())
    } else {
        Err(SchemaBuildError::InvalidDescription { owner: owner.to_string(), what })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryClient;
    use crate::router::model::Snowflake;
    use crate::router::module::{Capabilities, ModuleSpec, Namespace};
    use crate::router::options::{OptionValue, ResolveError};
    use crate::router::reply;

    struct Declared {
        ns: &'static str,
        commands: Vec<CommandDecl>,
        buttons: Vec<ButtonDecl>,
    }

    impl HandlerModule for Declared {
        fn namespace(&self) -> Namespace {
            Namespace::new(self.ns, "Test commands")
        }

        fn capabilities(self: Arc<Self>) -> Capabilities {
            let mut caps = Capabilities::new();
            caps.commands = self.commands.clone();
            caps.buttons = self.buttons.clone();
            caps
        }
    }

    fn spec(ns: &'static str, commands: Vec<CommandDecl>, buttons: Vec<ButtonDecl>) -> ModuleSpec {
        ModuleSpec::of(move |_, _| Declared { ns, commands: commands.clone(), buttons: buttons.clone() })
    }

    fn cmd(method: &'static str) -> CommandDecl {
        CommandDecl::new(method, "Does a thing", |_, _| reply::empty()).param(Param::command_context())
    }

    fn raw_text(
        raw: serde_json::Value,
        _: crate::router::options::Resolver,
    ) -> futures_util::future::BoxFuture<'static, Result<OptionValue, ResolveError>> {
        Box::pin(async move { Ok(OptionValue::String(raw.to_string())) })
    }

    fn build(registry: &OptionTypeRegistry, modules: ModuleRegistry) -> Result<Bindings, SchemaBuildError> {
        let client: Arc<dyn ClientHandle> = Arc::new(InMemoryClient::new());
        SchemaBuilder::new(registry).build(&modules, Snowflake::new(1), &client)
    }

    #[test]
    fn options_keep_declaration_order() {
        let decl = cmd("play")
            .param(Param::option::<String>("video", "What to play"))
            .param(Param::option::<i64>("volume", "Volume").optional())
            .param(Param::option::<bool>("loop", "Loop it").optional());
        let bindings = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![decl], vec![])),
        )
        .unwrap();

        let opts = &bindings.schema[0].subcommands[0].options;
        let names: Vec<_> = opts.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["video", "volume", "loop"]);
        assert_eq!(opts[1].option_type, OptionType::Integer);
        assert!(opts[0].required && !opts[1].required);
        let args = &bindings.commands["m"].get("play").unwrap().args;
        assert_eq!(args.iter().map(|a| a.position).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn explicit_name_overrides_method() {
        let bindings = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![cmd("show_queue").named("q")], vec![])),
        )
        .unwrap();
        assert_eq!(bindings.schema[0].subcommands[0].name, "q");
        assert_eq!(bindings.sub_command_count(), 1);
    }

    #[test]
    fn missing_context_names_method() {
        let decl = CommandDecl::new("play", "Play", |_, _| reply::empty())
            .param(Param::option::<String>("video", "What"));
        let err = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![decl], vec![])),
        )
        .err()
        .unwrap();
        assert_eq!(err, SchemaBuildError::MissingContext { method: "Declared::play".into() });
    }

    #[test]
    fn untagged_parameter_is_rejected() {
        let decl = cmd("play").param(Param::untagged::<String>());
        let err = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![decl], vec![])),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SchemaBuildError::MissingOptionMetadata { position: 1, .. }));
    }

    #[test]
    fn unsupported_type_with_subset_registry() {
        let mut registry = OptionTypeRegistry::empty();
        registry.register::<String>(OptionType::String, raw_text);
        let decl = cmd("volume").param(Param::option::<i64>("volume", "Level"));
        let err = build(&registry, ModuleRegistry::new().with(spec("m", vec![decl], vec![])))
            .err()
            .unwrap();
        assert!(matches!(err, SchemaBuildError::UnsupportedOptionType { ref option, .. } if option == "volume"));
    }

    #[test]
    fn duplicate_namespace_rejected() {
        let modules = ModuleRegistry::new()
            .with(spec("m", vec![cmd("a")], vec![]))
            .with(spec("m", vec![cmd("b")], vec![]));
        let err = build(&OptionTypeRegistry::standard(), modules).err().unwrap();
        assert!(matches!(err, SchemaBuildError::DuplicateNamespace { ref namespace, .. } if namespace == "m"));
    }

    #[test]
    fn duplicate_sub_command_rejected() {
        let modules = ModuleRegistry::new().with(spec("m", vec![cmd("a"), cmd("b").named("a")], vec![]));
        let err = build(&OptionTypeRegistry::standard(), modules).err().unwrap();
        assert!(matches!(err, SchemaBuildError::DuplicateSubCommand { ref name, .. } if name == "a"));
    }

    #[test]
    fn duplicate_option_rejected() {
        let decl = cmd("a")
            .param(Param::option::<String>("x", "X"))
            .param(Param::option::<i64>("x", "X again"));
        let err = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![decl], vec![])),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SchemaBuildError::DuplicateOption { .. }));
    }

    #[test]
    fn platform_name_rules() {
        for bad in ["Play", "", "has space", "a".repeat(33).leak() as &str] {
            let decl = cmd("x").named(bad);
            let err = build(
                &OptionTypeRegistry::standard(),
                ModuleRegistry::new().with(spec("m", vec![decl], vec![])),
            )
            .err()
            .unwrap();
            assert!(matches!(err, SchemaBuildError::InvalidName { what: "sub-command", .. }), "{bad:?}");
        }
        let long = CommandDecl::new("x", "d".repeat(101), |_, _| reply::empty()).param(Param::command_context());
        let err = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![long], vec![])),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SchemaBuildError::InvalidDescription { .. }));
    }

    #[test]
    fn button_listener_rules() {
        let ok = ButtonDecl::new("on_press", "X-", |_| reply::empty()).param(Param::button_context());
        let bindings = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![cmd("a")], vec![ok])),
        )
        .unwrap();
        assert_eq!(bindings.buttons.len(), 1);

        let wrong = ButtonDecl::new("on_press", "X-", |_| reply::empty()).param(Param::command_context());
        let err = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![], vec![wrong])),
        )
        .err()
        .unwrap();
        assert_eq!(err, SchemaBuildError::InvalidButtonListener { method: "Declared::on_press".into() });

        let empty = ButtonDecl::new("on_press", "", |_| reply::empty()).param(Param::button_context());
        let err = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![], vec![empty])),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SchemaBuildError::EmptyButtonPrefix { .. }));
    }

    #[test]
    fn module_without_commands_is_not_published() {
        let bindings = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("quiet", vec![], vec![])),
        )
        .unwrap();
        assert!(bindings.schema.is_empty());
        assert!(bindings.commands.is_empty());
    }

    #[test]
    fn schema_wire_shape() {
        let decl = cmd("volume").param(Param::option::<i64>("volume", "Level").optional());
        let bindings = build(
            &OptionTypeRegistry::standard(),
            ModuleRegistry::new().with(spec("m", vec![decl], vec![])),
        )
        .unwrap();
        let v = serde_json::to_value(&bindings.schema).unwrap();
        assert_eq!(
            v,
            serde_json::json!([{
                "name": "m",
                "description": "Test commands",
                "subcommands": [{
                    "name": "volume",
                    "description": "Does a thing",
                    "options": [{ "name": "volume", "description": "Level", "type": "INTEGER", "required": false }]
                }]
            }])
        );
    }
}
