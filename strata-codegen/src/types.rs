//! Rust type inspection for field classification.

use syn::{GenericArgument, PathArguments, Type};

/// The inner type of `Wrapper<T>` when `ty` is exactly that shape.
pub fn unwrap_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// The last path segment's name: `Order` for `crate::shop::Order`.
pub fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// Check if a type is `Vec<T>` for some `T` other than `u8`.
pub fn is_record_vec(ty: &Type) -> bool {
    unwrap_generic(ty, "Vec").is_some_and(|inner| last_ident(inner).as_deref() != Some("u8"))
}

/// The `StorageKind` variant for a column type, `Option` already removed.
pub fn storage_kind(ty: &Type) -> Option<&'static str> {
    if unwrap_generic(ty, "Vec").is_some() {
        return (!is_record_vec(ty)).then_some("Bytes");
    }
    let kind = match last_ident(ty)?.as_str() {
        "bool" => "Bool",
        "i8" | "i16" | "i32" | "u8" | "u16" | "u32" => "Int",
        "i64" | "u64" | "isize" | "usize" => "BigInt",
        "f32" | "f64" => "Float",
        "String" => "Text",
        "DateTime" => "Timestamp",
        "Value" => "Json",
        "Uuid" => "Uuid",
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_unwrap_option() {
        let ty: Type = parse_quote!(Option<String>);
        assert_eq!(unwrap_generic(&ty, "Option").and_then(last_ident).as_deref(), Some("String"));

        let ty: Type = parse_quote!(String);
        assert!(unwrap_generic(&ty, "Option").is_none());
    }

    #[test]
    fn test_record_vec_excludes_bytes() {
        let ty: Type = parse_quote!(Vec<Email>);
        assert!(is_record_vec(&ty));

        let ty: Type = parse_quote!(Vec<u8>);
        assert!(!is_record_vec(&ty));
        assert_eq!(storage_kind(&ty), Some("Bytes"));
    }

    #[test]
    fn test_storage_kinds() {
        let cases: [(Type, Option<&str>); 6] = [
            (parse_quote!(i32), Some("Int")),
            (parse_quote!(i64), Some("BigInt")),
            (parse_quote!(chrono::DateTime<chrono::Utc>), Some("Timestamp")),
            (parse_quote!(serde_json::Value), Some("Json")),
            (parse_quote!(uuid::Uuid), Some("Uuid")),
            (parse_quote!(Address), None),
        ];
        for (ty, expected) in cases {
            assert_eq!(storage_kind(&ty), expected);
        }
    }
}
