use serde::{Deserialize, Serialize};
use tracing::debug;

/// Profile variants of a base user. Each variant owns an extension table whose
/// primary key is the base user's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    Customer,
}

impl UserType {
    pub const ALL: [UserType; 2] = [UserType::Admin, UserType::Customer];

    pub fn tag(self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::Customer => "customer",
        }
    }

    /// Name the profile relation is registered under.
    pub fn relation_name(self) -> &'static str {
        match self {
            UserType::Admin => "adminprofile",
            UserType::Customer => "customerprofile",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            UserType::Admin => "admin_profile",
            UserType::Customer => "customer_profile",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    fn from_relation(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.relation_name() == name)
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Relations the application registers at startup.
pub const PROFILE_RELATIONS: [&str; 2] = ["adminprofile", "customerprofile"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserTypeChoice {
    pub value: &'static str,
    pub label: String,
}

/// Ordered set of profile variants known to the running application.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    types: Vec<UserType>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::from_relations(&PROFILE_RELATIONS)
    }
}

impl ProfileRegistry {
    /// Relation names that do not resolve to a variant are skipped.
    pub fn from_relations(names: &[&str]) -> Self {
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            match UserType::from_relation(name) {
                Some(t) if !types.contains(&t) => types.push(t),
                Some(_) => {}
                None => debug!(relation = %name, "skipping unknown profile relation"),
            }
        }
        Self { types }
    }

    pub fn get_user_types(&self) -> Vec<&'static str> {
        self.types.iter().map(|t| t.tag()).collect()
    }

    pub fn get_user_type_choices(&self) -> Vec<(&'static str, String)> {
        self.get_user_types()
            .into_iter()
            .map(|tag| (tag, capitalize(&camel_case_to_spaces(tag))))
            .collect()
    }

    pub fn choices(&self) -> Vec<UserTypeChoice> {
        self.get_user_type_choices()
            .into_iter()
            .map(|(value, label)| UserTypeChoice { value, label })
            .collect()
    }

    /// Resolves a tag, but only for registered variants.
    pub fn resolve(&self, tag: &str) -> Option<UserType> {
        UserType::from_tag(tag).filter(|t| self.types.contains(t))
    }
}

/// `"AdminProfile"` -> `"admin profile"`, `"HTTPServer"` -> `"http server"`.
pub fn camel_case_to_spaces(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let after_lower = i > 0 && chars[i - 1].is_lowercase();
            let before_non_upper = chars.get(i + 1).is_some_and(|n| !n.is_uppercase());
            if after_lower || before_non_upper {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out.trim().to_lowercase()
}

/// Uppercases the first character and lowercases the rest.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_lists_admin_then_customer() {
        let registry = ProfileRegistry::default();
        assert_eq!(registry.get_user_types(), vec!["admin", "customer"]);
        assert_eq!(
            registry.get_user_type_choices(),
            vec![("admin", "Admin".to_string()), ("customer", "Customer".to_string())]
        );
    }

    #[test]
    fn unknown_relations_are_skipped() {
        let registry = ProfileRegistry::from_relations(&["customerprofile", "staffprofile", "customerprofile"]);
        assert_eq!(registry.get_user_types(), vec!["customer"]);
        assert_eq!(registry.resolve("admin"), None);
        assert_eq!(registry.resolve("customer"), Some(UserType::Customer));
    }

    #[test]
    fn camel_case_splitting() {
        assert_eq!(camel_case_to_spaces("admin"), "admin");
        assert_eq!(camel_case_to_spaces("AdminProfile"), "admin profile");
        assert_eq!(camel_case_to_spaces("superUser"), "super user");
        assert_eq!(camel_case_to_spaces("HTTPServer"), "http server");
        assert_eq!(capitalize("super user"), "Super user");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn user_type_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&UserType::Admin).unwrap(), "\"admin\"");
        assert_eq!(UserType::from_tag("customer"), Some(UserType::Customer));
        assert_eq!(UserType::from_tag("staff"), None);
    }
}
