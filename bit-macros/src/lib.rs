//! Procedural macros for bit

use darling::{FromDeriveInput, FromField, FromMeta};
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Field naming convention applied to store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRule {
    CamelCase,
    PascalCase,
    SnakeCase,
    KebabCase,
    ScreamingSnakeCase,
    Lowercase,
}

impl FromMeta for RenameRule {
    fn from_string(value: &str) -> darling::Result<Self> {
        match value {
            "camelCase" => Ok(Self::CamelCase),
            "PascalCase" => Ok(Self::PascalCase),
            "snake_case" => Ok(Self::SnakeCase),
            "kebab-case" => Ok(Self::KebabCase),
            "SCREAMING_SNAKE_CASE" => Ok(Self::ScreamingSnakeCase),
            "lowercase" => Ok(Self::Lowercase),
            other => Err(darling::Error::unknown_value(other)),
        }
    }
}

impl RenameRule {
    /// Apply to a snake_case field name.
    fn apply(self, field: &str) -> String {
        let words = field.split('_').filter(|w| !w.is_empty());
        match self {
            Self::SnakeCase => field.to_string(),
            Self::Lowercase => field.replace('_', ""),
            Self::KebabCase => words.collect::<Vec<_>>().join("-"),
            Self::ScreamingSnakeCase => field.to_uppercase(),
            Self::PascalCase => words.map(capitalize).collect(),
            Self::CamelCase => words
                .enumerate()
                .map(|(i, w)| if i == 0 { w.to_string() } else { capitalize(w) })
                .collect(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Container-level attributes for #[derive(Selectors)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(selectors), supports(struct_named))]
struct SelectorsOpts {
    ident: syn::Ident,
    generics: syn::Generics,
    data: darling::ast::Data<(), SelectorField>,

    /// Path prepended to every field key
    #[darling(default)]
    prefix: Option<String>,

    /// Naming convention for field keys
    #[darling(default)]
    rename_all: Option<RenameRule>,
}

/// Field-level attributes
#[derive(Debug, FromField)]
#[darling(attributes(selector))]
struct SelectorField {
    ident: Option<syn::Ident>,
    ty: syn::Type,

    /// Explicit key, used as-is
    #[darling(default)]
    rename: Option<String>,

    /// Generate no selector for this field
    #[darling(default)]
    skip: bool,
}

/// Derive typed store selectors for a struct's fields
///
/// Generates one associated `const fn` per field returning
/// `bit::Selector<FieldType>` for the path `prefix.key`.
///
/// # Attributes
///
/// - `#[selectors(prefix = "consolidation.vip")]`: path of the struct in the tree
/// - `#[selectors(rename_all = "camelCase")]`: key convention (`camelCase`,
///   `PascalCase`, `snake_case`, `kebab-case`, `SCREAMING_SNAKE_CASE`, `lowercase`)
/// - `#[selector(rename = "q")]`: explicit key for one field
/// - `#[selector(skip)]`: no selector for this field
///
/// # Example
/// ```ignore
/// #[derive(Selectors)]
/// #[selectors(prefix = "consolidation.vip", rename_all = "camelCase")]
/// struct VipState {
///     selected_id: Option<String>,
///     consolidator_q: String,
/// }
///
/// assert_eq!(VipState::selected_id().path(), "consolidation.vip.selectedId");
/// ```
#[proc_macro_derive(Selectors, attributes(selectors, selector))]
pub fn derive_selectors(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match SelectorsOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;
    let (impl_generics, ty_generics, where_clause) = opts.generics.split_for_impl();
    let prefix = opts
        .prefix
        .as_deref()
        .map(|p| p.trim_matches('.'))
        .filter(|p| !p.is_empty());

    let darling::ast::Data::Struct(fields) = &opts.data else {
        return syn::Error::new_spanned(&input, "Selectors can only be derived for structs")
            .to_compile_error()
            .into();
    };

    let selectors = fields.fields.iter().filter(|f| !f.skip).filter_map(|field| {
        let ident = field.ident.as_ref()?;
        let ty = &field.ty;
        let raw = ident.to_string();
        let raw = raw.strip_prefix("r#").unwrap_or(&raw);

        let key = match (&field.rename, opts.rename_all) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => rule.apply(raw),
            (None, None) => raw.to_string(),
        };
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        let doc = format!("Selector for `{path}`.");

        Some(quote! {
            #[doc = #doc]
            pub const fn #ident() -> ::bit::Selector<#ty> {
                ::bit::Selector::new(#path)
            }
        })
    });

    let expanded = quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            #(#selectors)*
        }
    };

    TokenStream::from(expanded)
}
