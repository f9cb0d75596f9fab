//! Option Type Registry — maps a handler parameter's Rust type to its schema
//! type and to the extractor that turns a loosely-typed wire value into a
//! typed [`OptionValue`].
//!
//! Supporting a new parameter type means one [`OptionTypeRegistry::register`]
//! call (plus a [`FromOptionValue`] impl); nothing else in the router changes.
//! The registry is built once at bootstrap and shared read-only.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client::{ClientError, ClientHandle};

use super::model::{ChannelRef, RoleRef, Snowflake, TenantId, UserRef};

// ── Wire types ────────────────────────────────────────────────────────────────

/// Option type codes as they appear on inbound interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InteractionOptionType {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
}

impl InteractionOptionType {
    pub fn code(self) -> u8 {
        match self {
            Self::SubCommand => 1,
            Self::SubCommandGroup => 2,
            Self::String => 3,
            Self::Integer => 4,
            Self::Boolean => 5,
            Self::User => 6,
            Self::Channel => 7,
            Self::Role => 8,
            Self::Mentionable => 9,
            Self::Number => 10,
        }
    }
}

impl TryFrom<u8> for InteractionOptionType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::SubCommand,
            2 => Self::SubCommandGroup,
            3 => Self::String,
            4 => Self::Integer,
            5 => Self::Boolean,
            6 => Self::User,
            7 => Self::Channel,
            8 => Self::Role,
            9 => Self::Mentionable,
            10 => Self::Number,
            other => return Err(format!("unknown option type code {other}")),
        })
    }
}

impl From<InteractionOptionType> for u8 {
    fn from(kind: InteractionOptionType) -> Self {
        kind.code()
    }
}

/// The option types a handler may declare. Serialised by name in the
/// registered command schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
}

impl OptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Boolean => "BOOLEAN",
            Self::User => "USER",
            Self::Channel => "CHANNEL",
            Self::Role => "ROLE",
        }
    }

    pub fn wire_type(self) -> InteractionOptionType {
        match self {
            Self::String => InteractionOptionType::String,
            Self::Integer => InteractionOptionType::Integer,
            Self::Boolean => InteractionOptionType::Boolean,
            Self::User => InteractionOptionType::User,
            Self::Channel => InteractionOptionType::Channel,
            Self::Role => InteractionOptionType::Role,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// A marshaled option value, ready to hand to a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    User(UserRef),
    Channel(ChannelRef),
    Role(RoleRef),
}

/// Conversion from a marshaled value back into the parameter's own type.
pub trait FromOptionValue: Sized + 'static {
    fn from_option_value(value: &OptionValue) -> Option<Self>;
}

macro_rules! from_option_value {
    ($ty:ty, $variant:ident) => {
        impl FromOptionValue for $ty {
            fn from_option_value(value: &OptionValue) -> Option<Self> {
                match value {
                    OptionValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

from_option_value!(String, String);
from_option_value!(i64, Integer);
from_option_value!(bool, Boolean);
from_option_value!(UserRef, User);
from_option_value!(ChannelRef, Channel);
from_option_value!(RoleRef, Role);

/// Positional call arguments after the leading context argument.
/// `None` marks an option the caller did not supply (or that failed to
/// resolve).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<Option<OptionValue>>,
}

impl Args {
    pub fn new(values: Vec<Option<OptionValue>>) -> Self {
        Self { values }
    }

    /// Typed value at `position`, or `None` if absent or of another type.
    pub fn get<T: FromOptionValue>(&self, position: usize) -> Option<T> {
        self.raw(position).and_then(T::from_option_value)
    }

    pub fn raw(&self, position: usize) -> Option<&OptionValue> {
        self.values.get(position).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// An option value could not be turned into its declared type.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("expected {expected} value, got {raw}")]
    Mismatch { expected: OptionType, raw: String },

    #[error("invalid entity id {0:?}")]
    InvalidId(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// What an extractor may consult to resolve referenced entities.
#[derive(Clone)]
pub struct Resolver {
    pub tenant: TenantId,
    pub client: Arc<dyn ClientHandle>,
}

/// Extracts a typed value from a wire value. Entity references suspend on the
/// client lookup.
pub type Extractor = fn(Value, Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>>;

/// One row of the registry.
#[derive(Clone)]
pub struct OptionTypeEntry {
    pub option_type: OptionType,
    pub type_name: &'static str,
    extractor: Extractor,
}

impl OptionTypeEntry {
    pub fn extract(
        &self,
        raw: Value,
        resolver: Resolver,
    ) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
        (self.extractor)(raw, resolver)
    }
}

impl fmt::Debug for OptionTypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionTypeEntry")
            .field("option_type", &self.option_type)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Parameter type → (schema type, extractor).
#[derive(Debug, Clone, Default)]
pub struct OptionTypeRegistry {
    entries: HashMap<TypeId, OptionTypeEntry>,
}

impl OptionTypeRegistry {
    /// A registry with no supported types. Tests use this to exercise
    /// "unsupported type" failures.
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// The six standard option types.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<String>(OptionType::String, extract_string)
            .register::<i64>(OptionType::Integer, extract_integer)
            .register::<bool>(OptionType::Boolean, extract_boolean)
            .register::<UserRef>(OptionType::User, extract_user)
            .register::<ChannelRef>(OptionType::Channel, extract_channel)
            .register::<RoleRef>(OptionType::Role, extract_role);
        registry
    }

    pub fn register<T: FromOptionValue>(
        &mut self,
        option_type: OptionType,
        extractor: Extractor,
    ) -> &mut Self {
        self.entries.insert(
            TypeId::of::<T>(),
            OptionTypeEntry { option_type, type_name: type_name::<T>(), extractor },
        );
        self
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<&OptionTypeEntry> {
        self.entries.get(&type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn mismatch(expected: OptionType, raw: &Value) -> ResolveError {
    ResolveError::Mismatch { expected, raw: raw.to_string() }
}

fn parse_id(raw: &Value) -> Result<Snowflake, ResolveError> {
    match raw {
        Value::String(s) => s.parse().map_err(|_| ResolveError::InvalidId(s.clone())),
        Value::Number(n) => n
            .as_u64()
            .map(Snowflake::new)
            .ok_or_else(|| ResolveError::InvalidId(n.to_string())),
        other => Err(ResolveError::InvalidId(other.to_string())),
    }
}

fn extract_string(raw: Value, _: Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
    let result = match raw {
        Value::String(s) => Ok(OptionValue::String(s)),
        other => Err(mismatch(OptionType::String, &other)),
    };
    futures_util::future::ready(result).boxed()
}

fn extract_integer(raw: Value, _: Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
    let result = match &raw {
        Value::Number(n) => n.as_i64().map(OptionValue::Integer),
        Value::String(s) => s.trim().parse().ok().map(OptionValue::Integer),
        _ => None,
    }
    .ok_or_else(|| mismatch(OptionType::Integer, &raw));
    futures_util::future::ready(result).boxed()
}

fn extract_boolean(raw: Value, _: Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
    let result = match &raw {
        Value::Bool(b) => Ok(OptionValue::Boolean(*b)),
        Value::String(s) if s == "true" => Ok(OptionValue::Boolean(true)),
        Value::String(s) if s == "false" => Ok(OptionValue::Boolean(false)),
        _ => Err(mismatch(OptionType::Boolean, &raw)),
    };
    futures_util::future::ready(result).boxed()
}

fn extract_user(raw: Value, resolver: Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
    async move {
        let id = parse_id(&raw)?;
        let user = resolver.client.resolve_user(resolver.tenant, id).await?;
        Ok(OptionValue::User(user))
    }
    .boxed()
}

fn extract_channel(raw: Value, resolver: Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
    async move {
        let id = parse_id(&raw)?;
        let channel = resolver.client.resolve_channel(resolver.tenant, id).await?;
        Ok(OptionValue::Channel(channel))
    }
    .boxed()
}

fn extract_role(raw: Value, resolver: Resolver) -> BoxFuture<'static, Result<OptionValue, ResolveError>> {
    async move {
        let id = parse_id(&raw)?;
        let role = resolver.client.resolve_role(resolver.tenant, id).await?;
        Ok(OptionValue::Role(role))
    }
    .boxed()
}
