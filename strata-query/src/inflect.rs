//! Naming rules: type names to table names, fields to foreign keys.

use convert_case::{Case, Casing};

/// Words whose plural form is the word itself.
const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "deer",
    "news",
    "data",
];

/// Snake-case a Rust type or field name (`CreditCard` -> `credit_card`).
pub fn to_snake(name: &str) -> String {
    name.to_case(Case::Snake)
}

/// Pluralize the last `_`-separated word of a snake-case name.
pub fn pluralize(name: &str) -> String {
    match name.rsplit_once('_') {
        Some((head, last)) => format!("{}_{}", head, pluralize_word(last)),
        None => pluralize_word(name),
    }
}

fn pluralize_word(word: &str) -> String {
    match word {
        "person" => return "people".to_string(),
        "child" => return "children".to_string(),
        "man" => return "men".to_string(),
        "woman" => return "women".to_string(),
        "foot" => return "feet".to_string(),
        "tooth" => return "teeth".to_string(),
        "goose" => return "geese".to_string(),
        "mouse" => return "mice".to_string(),
        "datum" => return "data".to_string(),
        "index" => return "indices".to_string(),
        "matrix" => return "matrices".to_string(),
        "vertex" => return "vertices".to_string(),
        "analysis" => return "analyses".to_string(),
        "crisis" => return "crises".to_string(),
        "axis" => return "axes".to_string(),
        "leaf" => return "leaves".to_string(),
        "knife" => return "knives".to_string(),
        "wife" => return "wives".to_string(),
        "life" => return "lives".to_string(),
        "hero" => return "heroes".to_string(),
        "potato" => return "potatoes".to_string(),
        "tomato" => return "tomatoes".to_string(),
        _ => {}
    }

    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }

    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        return format!("{word}es");
    }

    // quiz -> quizzes
    if word.ends_with('z') {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() >= 2 && "aeiou".contains(chars[chars.len() - 2]) {
            return format!("{word}zes");
        }
        return format!("{word}es");
    }

    if let Some(stripped) = word.strip_suffix('y') {
        if let Some(last) = stripped.chars().last() {
            if !"aeiou".contains(last) {
                return format!("{stripped}ies");
            }
        }
        return format!("{word}s");
    }

    format!("{word}s")
}

/// Default foreign key column for a reference to `type_name`
/// (`Owner` -> `owner_id`).
pub fn foreign_key_for(type_name: &str) -> String {
    format!("{}_id", to_snake(type_name))
}

/// Default many-to-many join table name for two snake-case base names,
/// in declaration order (`user`, `language` -> `user_languages`).
pub fn join_table_for(owner: &str, target: &str) -> String {
    format!("{}_{}", owner, pluralize(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake() {
        assert_eq!(to_snake("CreditCard"), "credit_card");
        assert_eq!(to_snake("User"), "user");
        assert_eq!(to_snake("HTTPRequest"), "http_request");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("credit_card"), "credit_cards");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("company"), "companies");
        assert_eq!(pluralize("toy"), "toys");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("place_address"), "place_addresses");
        assert_eq!(pluralize("cart"), "carts");
        assert_eq!(pluralize("quiz"), "quizzes");
        assert_eq!(pluralize("news"), "news");
        assert_eq!(pluralize("photo"), "photos");
    }

    #[test]
    fn test_foreign_keys() {
        assert_eq!(foreign_key_for("User"), "user_id");
        assert_eq!(foreign_key_for("CreditCard"), "credit_card_id");
        assert_eq!(join_table_for("user", "language"), "user_languages");
    }
}
