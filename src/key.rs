//! Deterministic cache keys for intercepted operations
//!
//! A key is derived from the operation's identity (service and method name)
//! and the runtime type and string form of each argument. The resulting text
//! is hashed with MD5 and hex-encoded, so keys are safe to use as file names
//! inside the cache directory.

use md5::{Digest, Md5};

/// Suffix stripped from operation names when building keys for fresh calls,
/// so `getUserFresh` shares its cache entry with `getUser`.
pub const FRESH_SUFFIX: &str = "Fresh";

/// Separator placed between the operation name and each argument
const SEPARATOR: &str = "_";

/// Identity of a cacheable operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId {
    /// Name of the declaring service (e.g. "UserApi")
    pub service: &'static str,
    /// Name of the operation (e.g. "getUser")
    pub name: &'static str,
}

impl OperationId {
    /// Creates an operation identity
    pub const fn new(service: &'static str, name: &'static str) -> Self {
        Self { service, name }
    }

    /// Returns the operation name used for key derivation
    ///
    /// When `fresh` is set, a trailing [`FRESH_SUFFIX`] is removed.
    pub fn key_name(&self, fresh: bool) -> &'static str {
        if fresh {
            self.name.strip_suffix(FRESH_SUFFIX).unwrap_or(self.name)
        } else {
            self.name
        }
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.service, self.name)
    }
}

/// An argument that contributes to a cache key
///
/// Both the type name and the value take part in the key, so `42_i64` and
/// `"42"` produce different keys. Arguments are `Sync` so that a borrowed
/// argument list can be held by a `Send` future.
pub trait KeyArg: Sync {
    /// Runtime type name of the argument
    fn type_name(&self) -> &'static str;

    /// String form of the argument
    fn key_value(&self) -> String;
}

macro_rules! impl_key_arg {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl KeyArg for $ty {
                fn type_name(&self) -> &'static str {
                    $name
                }

                fn key_value(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_key_arg! {
    String => "String",
    str => "String",
    bool => "bool",
    char => "char",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    i128 => "i128",
    isize => "isize",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    usize => "usize",
    f32 => "f32",
    f64 => "f64",
}

impl<T: KeyArg + ?Sized> KeyArg for &T {
    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }

    fn key_value(&self) -> String {
        (**self).key_value()
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn type_name(&self) -> &'static str {
        match self {
            Some(value) => value.type_name(),
            None => "None",
        }
    }

    fn key_value(&self) -> String {
        match self {
            Some(value) => value.key_value(),
            None => "None".to_string(),
        }
    }
}

/// Builds the cache key for an operation call
///
/// # Arguments
/// * `operation` - Identity of the operation being called
/// * `fresh` - Whether this is the force-fresh variant of the operation
/// * `args` - The operation's arguments, in declaration order
///
/// # Returns
/// The lowercase hex MD5 digest of
/// `"{service}.{name}_{type}&{value}_{type}&{value}..."`
pub fn build_key(operation: &OperationId, fresh: bool, args: &[&dyn KeyArg]) -> String {
    let rendered: Vec<String> = args
        .iter()
        .map(|arg| format!("{}&{}", arg.type_name(), arg.key_value()))
        .collect();

    let text = format!(
        "{}.{}{}{}",
        operation.service,
        operation.key_name(fresh),
        SEPARATOR,
        rendered.join(SEPARATOR)
    );

    hex::encode(Md5::digest(text.as_bytes()))
}
