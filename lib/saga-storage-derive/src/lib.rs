use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{Data, DeriveInput, Fields, GenericArgument, Lit, PathArguments, Type, parse_macro_input};

/// Convert snake_case to PascalCase
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Convert snake_case to camelCase
fn to_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = !result.is_empty();
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

/// Apply a serde `rename_all` rule to a field identifier
fn apply_rename_all(rule: Option<&str>, ident: &str) -> String {
    match rule {
        Some("PascalCase") => to_pascal_case(ident),
        Some("camelCase") => to_camel_case(ident),
        Some("lowercase") => ident.to_lowercase(),
        Some("UPPERCASE") | Some("SCREAMING_SNAKE_CASE") => ident.to_uppercase(),
        Some("kebab-case") => ident.replace('_', "-"),
        Some("SCREAMING-KEBAB-CASE") => ident.replace('_', "-").to_uppercase(),
        _ => ident.to_string(),
    }
}

/// Consume the value of a nested meta we do not interpret
fn skip_meta_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| skip_meta_value(&nested))?;
    }
    Ok(())
}

fn parse_string(meta: &ParseNestedMeta) -> syn::Result<String> {
    let lit: Lit = meta.value()?.parse()?;
    match lit {
        Lit::Str(s) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

/// Container-level settings from `#[saga(...)]` and `#[serde(...)]`
#[derive(Default)]
struct ContainerAttrs {
    table: Option<String>,
    rename_all: Option<String>,
}

fn parse_container_attrs(input: &DeriveInput) -> syn::Result<ContainerAttrs> {
    let mut attrs = ContainerAttrs::default();

    for attr in &input.attrs {
        if attr.path().is_ident("saga") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    attrs.table = Some(parse_string(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported saga container attribute"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") && meta.input.peek(syn::Token![=]) {
                    attrs.rename_all = Some(parse_string(&meta)?);
                    Ok(())
                } else {
                    skip_meta_value(&meta)
                }
            })?;
        }
    }

    Ok(attrs)
}

/// How a flattened field's columns are prefixed
enum Prefix {
    None,
    Leaf,
    Custom(String),
}

/// Field-level settings from `#[saga(...)]` and `#[serde(...)]`
struct FieldAttrs {
    key: String,
    skip: bool,
    correlation_id: bool,
    version: bool,
    json: bool,
    column: Option<String>,
    flatten: Option<Prefix>,
}

fn parse_field_attrs(field: &syn::Field, rename_all: Option<&str>) -> syn::Result<FieldAttrs> {
    let ident = match &field.ident {
        Some(ident) => ident.to_string(),
        None => return Err(syn::Error::new_spanned(field, "expected a named field")),
    };
    let ident = ident.trim_start_matches("r#").to_string();

    let mut attrs = FieldAttrs {
        key: apply_rename_all(rename_all, &ident),
        skip: false,
        correlation_id: false,
        version: false,
        json: false,
        column: None,
        flatten: None,
    };

    for attr in &field.attrs {
        if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    if meta.input.peek(syn::Token![=]) {
                        attrs.key = parse_string(&meta)?;
                    } else {
                        meta.parse_nested_meta(|nested| {
                            if nested.path.is_ident("serialize") {
                                attrs.key = parse_string(&nested)?;
                                Ok(())
                            } else {
                                skip_meta_value(&nested)
                            }
                        })?;
                    }
                    Ok(())
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    attrs.skip = true;
                    Ok(())
                } else {
                    skip_meta_value(&meta)
                }
            })?;
        } else if attr.path().is_ident("saga") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    attrs.skip = true;
                } else if meta.path.is_ident("correlation_id") {
                    attrs.correlation_id = true;
                } else if meta.path.is_ident("version") {
                    attrs.version = true;
                } else if meta.path.is_ident("json") {
                    attrs.json = true;
                } else if meta.path.is_ident("column") {
                    attrs.column = Some(parse_string(&meta)?);
                } else if meta.path.is_ident("flatten") {
                    attrs.flatten.get_or_insert(Prefix::None);
                } else if meta.path.is_ident("prefix") {
                    attrs.flatten = Some(if meta.input.peek(syn::Token![=]) {
                        Prefix::Custom(parse_string(&meta)?)
                    } else {
                        Prefix::Leaf
                    });
                } else {
                    return Err(meta.error("unsupported saga field attribute"));
                }
                Ok(())
            })?;
        }
    }

    Ok(attrs)
}

/// `T` for `Option<T>`, else the type itself
fn unwrap_option(ty: &Type) -> &Type {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

fn is_option(ty: &Type) -> bool {
    !std::ptr::eq(unwrap_option(ty), ty)
}

/// Map Rust type to storage field type
fn rust_type_to_field_type(ty: &Type) -> TokenStream2 {
    let inner = unwrap_option(ty);
    let type_str = quote!(#inner).to_string().replace(' ', "");

    match type_str.as_str() {
        s if s.contains("NaiveDateTime") => quote!(::saga_storage::FieldType::Timestamp),
        s if s.contains("DateTime") => quote!(::saga_storage::FieldType::Datetime),
        s if s == "Uuid" || s.ends_with("::Uuid") => quote!(::saga_storage::FieldType::Uuid),
        "i8" | "i16" | "i32" | "u8" | "u16" => quote!(::saga_storage::FieldType::Int),
        "i64" | "u32" | "u64" | "isize" | "usize" => quote!(::saga_storage::FieldType::BigInt),
        "f32" | "f64" => quote!(::saga_storage::FieldType::Float),
        "bool" => quote!(::saga_storage::FieldType::Bool),
        s if s.starts_with("Vec<")
            || s.starts_with("HashMap<")
            || s.starts_with("BTreeMap<")
            || s.ends_with("Value") =>
        {
            quote!(::saga_storage::FieldType::Json)
        }
        // Default to text for String and everything else
        _ => quote!(::saga_storage::FieldType::Text),
    }
}

fn named_fields(input: &DeriveInput) -> syn::Result<&syn::punctuated::Punctuated<syn::Field, syn::Token![,]>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                "saga types must be structs with named fields",
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            "saga types must be structs",
        )),
    }
}

fn field_type_tokens(field: &syn::Field, attrs: &FieldAttrs) -> TokenStream2 {
    if attrs.json {
        quote!(::saga_storage::FieldType::Json)
    } else {
        rust_type_to_field_type(&field.ty)
    }
}

/// Derive macro for the `Saga` trait
///
/// Generates the static descriptor from the struct's fields, using the same
/// keys serde uses (`rename_all` and `rename` are honored, `skip` fields are
/// not persisted).
///
/// ## Field roles
///
/// - `correlation_id` (or `#[saga(correlation_id)]`) - the `Uuid` key
/// - `version` (or `#[saga(version)]`) - `i32` or `Option<i32>` concurrency
///   counter; its presence makes the type versioned
///
/// ## Attributes
///
/// - `#[saga(table = "...")]` on the struct overrides the table name
/// - `#[saga(column = "...")]` stores a field in a differently named column
/// - `#[saga(flatten)]` expands a nested `SagaFields` type into columns
/// - `#[saga(prefix)]` / `#[saga(prefix = "...")]` flattens with column prefixes
/// - `#[saga(json)]` stores a field as JSON
/// - `#[saga(skip)]` leaves a field out of storage
///
/// ## Example
///
/// ```text
/// #[derive(Serialize, Deserialize, Saga)]
/// #[serde(rename_all = "PascalCase")]
/// #[saga(table = "OrderStates")]
/// struct OrderState {
///     pub correlation_id: Uuid,
///     pub version: i32,
///     pub customer: String,
///     #[saga(prefix)]
///     pub shipping: Option<Address>,
/// }
/// ```
#[proc_macro_derive(Saga, attributes(saga))]
pub fn derive_saga(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_saga(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_saga(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let container = parse_container_attrs(input)?;
    let fields = named_fields(input)?;

    let mut calls = Vec::new();
    let mut id_field = None;
    let mut version_field = None;

    if let Some(table) = &container.table {
        calls.push(quote! { .table(#table) });
    }

    for field in fields.iter() {
        let attrs = parse_field_attrs(field, container.rename_all.as_deref())?;
        if attrs.skip {
            continue;
        }
        let ident = field.ident.as_ref();
        let key = &attrs.key;
        let is_id = attrs.correlation_id
            || (id_field.is_none() && ident.is_some_and(|i| i == "correlation_id"));
        let is_version = attrs.version
            || (version_field.is_none() && ident.is_some_and(|i| i == "version"));

        if is_id {
            if id_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field can be the correlation id",
                ));
            }
            calls.push(quote! {
                .field(#key, ::saga_storage::FieldType::Uuid)
                .correlation_id(#key)
            });
            id_field = Some(field);
        } else if is_version {
            if version_field.is_some() {
                return Err(syn::Error::new_spanned(field, "only one field can be the version"));
            }
            calls.push(quote! { .version(#key) });
            version_field = Some(field);
        } else if let Some(prefix) = &attrs.flatten {
            let nested = unwrap_option(&field.ty);
            calls.push(quote! {
                .flatten(#key, <#nested as ::saga_storage::SagaFields>::saga_fields())
            });
            match prefix {
                Prefix::None => {}
                Prefix::Leaf => calls.push(quote! { .map_prefix(#key, None) }),
                Prefix::Custom(prefix) => {
                    calls.push(quote! { .map_prefix(#key, Some(#prefix)) })
                }
            }
            continue;
        } else {
            let field_type = field_type_tokens(field, &attrs);
            calls.push(quote! { .field(#key, #field_type) });
        }

        if let Some(column) = &attrs.column {
            calls.push(quote! { .map_property(#key, #column) });
        }
    }

    let id_field = match id_field.and_then(|f| f.ident.as_ref()) {
        Some(ident) => ident,
        None => {
            return Err(syn::Error::new_spanned(
                name,
                "Saga requires a `correlation_id` field or one marked #[saga(correlation_id)]",
            ));
        }
    };

    let version_impl = match version_field {
        Some(field) => {
            let ident = &field.ident;
            if is_option(&field.ty) {
                quote! {
                    fn version(&self) -> Option<i32> {
                        self.#ident
                    }

                    fn set_version(&mut self, version: i32) {
                        self.#ident = Some(version);
                    }
                }
            } else {
                quote! {
                    fn version(&self) -> Option<i32> {
                        Some(self.#ident)
                    }

                    fn set_version(&mut self, version: i32) {
                        self.#ident = version;
                    }
                }
            }
        }
        None => quote! {},
    };

    Ok(quote! {
        impl #impl_generics ::saga_storage::Saga for #name #ty_generics #where_clause {
            fn descriptor() -> ::saga_storage::SagaDescriptor {
                ::saga_storage::SagaDescriptor::new(#type_name)
                    #(#calls)*
            }

            fn correlation_id(&self) -> ::saga_storage::Uuid {
                self.#id_field
            }

            #version_impl
        }
    })
}

/// Derive macro for the `SagaFields` trait
///
/// For nested types flattened into a parent saga with `#[saga(flatten)]` or
/// `#[saga(prefix)]`. Field keys follow serde as for `Saga`; nested types
/// can themselves be flattened.
#[proc_macro_derive(SagaFields, attributes(saga))]
pub fn derive_saga_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_saga_fields(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_saga_fields(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let container = parse_container_attrs(input)?;
    let fields = named_fields(input)?;

    let mut pushes = Vec::new();

    for field in fields.iter() {
        let attrs = parse_field_attrs(field, container.rename_all.as_deref())?;
        if attrs.skip {
            continue;
        }
        if attrs.correlation_id || attrs.version {
            return Err(syn::Error::new_spanned(
                field,
                "nested fields cannot be the correlation id or version",
            ));
        }
        let key = &attrs.key;

        match &attrs.flatten {
            Some(Prefix::None) => {
                let nested = unwrap_option(&field.ty);
                pushes.push(quote! {
                    fields.extend(
                        <#nested as ::saga_storage::SagaFields>::saga_fields()
                            .into_iter()
                            .map(|field| field.nested_under(#key)),
                    );
                });
            }
            Some(_) => {
                return Err(syn::Error::new_spanned(
                    field,
                    "column prefixes can only be declared on the saga type",
                ));
            }
            None => {
                let field_type = field_type_tokens(field, &attrs);
                let column = match &attrs.column {
                    Some(column) => quote! { .with_column(#column) },
                    None => quote! {},
                };
                pushes.push(quote! {
                    fields.push(::saga_storage::FieldDescriptor::new(#key, #field_type) #column);
                });
            }
        }
    }

    Ok(quote! {
        impl #impl_generics ::saga_storage::SagaFields for #name #ty_generics #where_clause {
            fn saga_fields() -> Vec<::saga_storage::FieldDescriptor> {
                let mut fields = Vec::new();
                #(#pushes)*
                fields
            }
        }
    })
}
