//! Service identification.
//!
//! A [`ServiceIdentifier`] is the opaque key under which providers are
//! registered. Three forms exist: a non-empty name, a [`Token`] (a
//! process-unique key carrying a human-readable label), and a Rust type.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use silsila_support::rendering::shorten_type_name;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique service key with a display label.
///
/// Two tokens are equal only if they are the *same* token; the label is
/// purely for display. Use tokens when two independent registrations must
/// never collide even if they pick the same label.
///
/// # Examples
/// ```
/// use silsila_container::identifier::Token;
///
/// let a = Token::new("logger");
/// let b = Token::new("logger");
/// assert_ne!(a, b);
/// assert_eq!(a.label(), "logger");
/// ```
#[derive(Clone)]
pub struct Token {
    id: u64,
    label: Arc<str>,
}

impl Token {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({}, id={})", self.label, self.id)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Identifies a service in a container.
///
/// Identifiers are compared the way their form dictates: names by value,
/// tokens by token identity, types by [`TypeId`].
///
/// # Examples
/// ```
/// use silsila_container::identifier::ServiceIdentifier;
///
/// struct Database;
///
/// let by_name = ServiceIdentifier::named("database");
/// let by_type = ServiceIdentifier::of::<Database>();
/// assert_ne!(by_name, by_type);
/// assert_eq!(by_name, ServiceIdentifier::named("database"));
/// ```
#[derive(Clone)]
pub enum ServiceIdentifier {
    /// A non-empty name, compared by value.
    Named(Arc<str>),
    /// A unique token, compared by identity.
    Token(Token),
    /// A Rust type, compared by [`TypeId`].
    Type {
        id: TypeId,
        name: &'static str,
    },
}

impl ServiceIdentifier {
    /// Creates a named identifier.
    ///
    /// # Panics
    /// Panics if `name` is empty.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "service identifier name must not be empty");
        Self::Named(name)
    }

    /// Creates an identifier for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// A short human-readable form, used in resolution paths.
    pub fn label(&self) -> String {
        match self {
            Self::Named(name) => name.to_string(),
            Self::Token(token) => token.label().to_string(),
            Self::Type { name, .. } => shorten_type_name(name),
        }
    }
}

impl PartialEq for ServiceIdentifier {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Named(a), Self::Named(b)) => a == b,
            (Self::Token(a), Self::Token(b)) => a == b,
            (Self::Type { id: a, .. }, Self::Type { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for ServiceIdentifier {}

impl Hash for ServiceIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Named(name) => {
                0u8.hash(state);
                name.hash(state);
            }
            Self::Token(token) => {
                1u8.hash(state);
                token.hash(state);
            }
            Self::Type { id, .. } => {
                2u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl fmt::Debug for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "ServiceIdentifier::Named({name:?})"),
            Self::Token(token) => write!(f, "ServiceIdentifier::Token({token:?})"),
            Self::Type { name, .. } => write!(f, "ServiceIdentifier::Type({name})"),
        }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<&str> for ServiceIdentifier {
    fn from(name: &str) -> Self {
        Self::named(name.to_string())
    }
}

impl From<String> for ServiceIdentifier {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<Token> for ServiceIdentifier {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<&Token> for ServiceIdentifier {
    fn from(token: &Token) -> Self {
        Self::Token(token.clone())
    }
}

impl From<&ServiceIdentifier> for ServiceIdentifier {
    fn from(identifier: &ServiceIdentifier) -> Self {
        identifier.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MyService;

    #[test]
    fn named_equality_by_value() {
        assert_eq!(
            ServiceIdentifier::named("db"),
            ServiceIdentifier::named("db")
        );
        assert_ne!(
            ServiceIdentifier::named("db"),
            ServiceIdentifier::named("cache")
        );
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_name_rejected() {
        let _ = ServiceIdentifier::named("");
    }

    #[test]
    fn tokens_are_unique() {
        let a = Token::new("svc");
        let b = Token::new("svc");
        assert_ne!(
            ServiceIdentifier::from(&a),
            ServiceIdentifier::from(&b)
        );
        assert_eq!(ServiceIdentifier::from(&a), ServiceIdentifier::from(a));
    }

    #[test]
    fn type_identity() {
        assert_eq!(
            ServiceIdentifier::of::<MyService>(),
            ServiceIdentifier::of::<MyService>()
        );
        assert_ne!(
            ServiceIdentifier::of::<MyService>(),
            ServiceIdentifier::of::<String>()
        );
    }

    #[test]
    fn forms_never_cross_match() {
        assert_ne!(
            ServiceIdentifier::named("MyService"),
            ServiceIdentifier::of::<MyService>()
        );
        assert_ne!(
            ServiceIdentifier::named("svc"),
            ServiceIdentifier::from(Token::new("svc"))
        );
    }

    #[test]
    fn usable_as_map_key() {
        let mut map = HashMap::new();
        map.insert(ServiceIdentifier::named("a"), 1);
        map.insert(ServiceIdentifier::of::<MyService>(), 2);
        assert_eq!(map.get(&ServiceIdentifier::named("a")), Some(&1));
        assert_eq!(map.get(&ServiceIdentifier::of::<MyService>()), Some(&2));
        assert_eq!(map.get(&ServiceIdentifier::named("b")), None);
    }

    #[test]
    fn type_label_is_shortened() {
        let id = ServiceIdentifier::of::<MyService>();
        assert_eq!(id.label(), "MyService");
    }

    #[test]
    fn unsized_type_identifier() {
        trait MyTrait {}
        let _ = ServiceIdentifier::of::<dyn MyTrait>();
    }
}
