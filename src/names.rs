use std::borrow::Cow;
use std::fmt::{Debug, Error as FmtError, Formatter};

/// Names of methods and fields
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes, in `some/pkg/Name` form
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;

    /// Construct a name from a static string, skipping validation
    ///
    /// Only for known-good literals (the core class names and test fixtures).
    fn from_str_unsafe(name: &'static str) -> Self;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }

    fn from_str_unsafe(name: &'static str) -> Self {
        UnqualifiedName(Cow::Borrowed(name))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').try_for_each(UnqualifiedName::check_valid)
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }

    fn from_str_unsafe(name: &'static str) -> Self {
        BinaryName(Cow::Borrowed(name))
    }
}

impl UnqualifiedName {
    /// Reserved marker name for constructors
    pub const INIT: UnqualifiedName = UnqualifiedName(Cow::Borrowed("<init>"));
}

impl BinaryName {
    /// Root of the class hierarchy; the only class with no superclass
    pub const OBJECT: BinaryName = BinaryName(Cow::Borrowed("core/Object"));

    /// Value class of string literals
    pub const STRING: BinaryName = BinaryName(Cow::Borrowed("core/String"));

    /// Value class of type literals
    pub const CLASS: BinaryName = BinaryName(Cow::Borrowed("core/Class"));
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        self.0.fmt(f)
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(UnqualifiedName::from_string(String::from("doubler")).is_ok());
        assert!(BinaryName::from_string(String::from("com/example/Doubler")).is_ok());
        assert!(BinaryName::from_string(String::from("Toplevel")).is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(UnqualifiedName::from_string(String::from("")).is_err());
        assert!(UnqualifiedName::from_string(String::from("a/b")).is_err());
        assert!(UnqualifiedName::from_string(String::from("a;b")).is_err());
        assert!(BinaryName::from_string(String::from("")).is_err());
        assert!(BinaryName::from_string(String::from("com//Example")).is_err());
        assert!(BinaryName::from_string(String::from("com.example.Foo")).is_err());
    }
}
