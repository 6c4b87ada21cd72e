use crate::utils::{apply_derives, ensure_required_fields, named_fields_from};
use proc_macro::TokenStream;
use quote::{ToTokens, quote};
use std::collections::{HashMap, HashSet};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, Ident, Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input,
};

/// #[change_event] 宏实现
/// - 支持具名字段变体与单元变体（单元变体展开为具名变体），不支持元组变体
/// - 确保每个变体具备字段：`id: Uuid`, `created: DateTime<Utc>`
/// - 生成 `::es_domain::domain_event::ChangeEvent` 实现（含判别符表 `DISCRIMINATORS`）
/// - 枚举级参数：`#[change_event(version = N)]`，默认 1
/// - 变体可覆写：`#[event(event_type = "...", event_version = N)]`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as ChangeEventAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let enum_item = match &mut input {
        Item::Enum(e) => e,
        other => {
            return syn::Error::new(
                other.span(),
                "#[change_event] can only be used on enum types",
            )
            .to_compile_error()
            .into();
        }
    };

    if enum_item.variants.is_empty() {
        return syn::Error::new(
            enum_item.span(),
            "#[change_event] requires at least one variant",
        )
        .to_compile_error()
        .into();
    }

    let default_version = cfg.version.unwrap_or_else(|| syn::parse_quote! { 1 });

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    apply_derives(&mut enum_item.attrs, required);

    let id_ty: Type = syn::parse_quote! { ::es_domain::uuid::Uuid };
    let created_ty: Type =
        syn::parse_quote! { ::es_domain::chrono::DateTime<::es_domain::chrono::Utc> };
    let required_fields = [("id", &id_ty), ("created", &created_ty)];

    let mut variant_types: HashMap<String, syn::LitStr> = HashMap::new();
    let mut variant_versions: HashMap<String, syn::LitInt> = HashMap::new();

    for v in &mut enum_item.variants {
        match &mut v.fields {
            syn::Fields::Named(fields_named) => {
                ensure_required_fields(fields_named, &required_fields);
            }
            syn::Fields::Unit => {
                v.fields = syn::Fields::Named(named_fields_from(&required_fields));
            }
            syn::Fields::Unnamed(_) => {
                return syn::Error::new(
                    v.span(),
                    "#[change_event] supports only named-field or unit variants",
                )
                .to_compile_error()
                .into();
            }
        }

        let mut retained_attrs = Vec::new();
        let mut type_lit: Option<syn::LitStr> = None;
        let mut version_lit: Option<syn::LitInt> = None;

        for attr in v.attrs.iter() {
            if !attr.path().is_ident("event") {
                retained_attrs.push(attr.clone());
                continue;
            }
            let vc = match parse_variant_event_attr(attr) {
                Ok(vc) => vc,
                Err(err) => return err.to_compile_error().into(),
            };
            if let Some(lit) = vc.ty {
                if type_lit.replace(lit).is_some() {
                    return syn::Error::new(
                        attr.span(),
                        "duplicate 'event_type' specified for this variant",
                    )
                    .to_compile_error()
                    .into();
                }
            }
            if let Some(lit) = vc.version {
                if version_lit.replace(lit).is_some() {
                    return syn::Error::new(
                        attr.span(),
                        "duplicate 'event_version' specified for this variant",
                    )
                    .to_compile_error()
                    .into();
                }
            }
        }

        v.attrs = retained_attrs;
        if let Some(lit) = type_lit {
            variant_types.insert(v.ident.to_string(), lit);
        }
        if let Some(lit) = version_lit {
            variant_versions.insert(v.ident.to_string(), lit);
        }
    }

    let enum_ident = &enum_item.ident;
    let enum_name = enum_ident.to_string();

    // 变体 -> (判别符, 版本)
    let mut discriminators: Vec<(Ident, syn::LitStr, syn::LitInt)> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for v in enum_item.variants.iter() {
        let key = v.ident.to_string();
        let ty = variant_types.get(&key).cloned().unwrap_or_else(|| {
            syn::LitStr::new(&format!("{enum_name}.{key}"), v.ident.span())
        });
        let ver = variant_versions
            .get(&key)
            .cloned()
            .unwrap_or_else(|| default_version.clone());
        let parsed_ver = match ver.base10_parse::<u32>() {
            Ok(n) => n,
            Err(err) => return err.to_compile_error().into(),
        };
        if !seen.insert((ty.value(), parsed_ver.to_string())) {
            return syn::Error::new(
                v.ident.span(),
                format!(
                    "duplicate event discriminator '{}' at version {}",
                    ty.value(),
                    parsed_ver
                ),
            )
            .to_compile_error()
            .into();
        }
        discriminators.push((v.ident.clone(), ty, ver));
    }

    let table = discriminators
        .iter()
        .map(|(_, ty, ver)| quote! { (#ty, #ver) });
    let type_arms = discriminators
        .iter()
        .map(|(ident, ty, _)| quote! { Self::#ident { .. } => #ty });
    let version_arms = discriminators
        .iter()
        .map(|(ident, _, ver)| quote! { Self::#ident { .. } => #ver });
    let id_arms = discriminators
        .iter()
        .map(|(ident, _, _)| quote! { Self::#ident { id, .. } => *id });
    let created_arms = discriminators
        .iter()
        .map(|(ident, _, _)| quote! { Self::#ident { created, .. } => *created });

    let (impl_generics, ty_generics, where_clause) = enum_item.generics.split_for_impl();

    let out = quote! {
        #enum_item

        impl #impl_generics ::es_domain::domain_event::ChangeEvent for #enum_ident #ty_generics #where_clause {
            const DISCRIMINATORS: &'static [(&'static str, u32)] = &[ #( #table, )* ];

            fn event_id(&self) -> ::es_domain::uuid::Uuid { match self { #( #id_arms, )* } }
            fn created(&self) -> ::es_domain::chrono::DateTime<::es_domain::chrono::Utc> { match self { #( #created_arms, )* } }
            fn event_type(&self) -> &'static str { match self { #( #type_arms, )* } }
            fn event_version(&self) -> u32 { match self { #( #version_arms, )* } }
        }
    };

    TokenStream::from(out)
}

// -------- parsing --------

struct VariantEventAttrConfig {
    ty: Option<syn::LitStr>,
    version: Option<syn::LitInt>,
}

fn parse_variant_event_attr(attr: &syn::Attribute) -> Result<VariantEventAttrConfig> {
    let syn::Meta::List(_) = &attr.meta else {
        return Err(syn::Error::new(attr.meta.span(), "expected #[event(...)]"));
    };

    let mut ty: Option<syn::LitStr> = None;
    let mut version: Option<syn::LitInt> = None;
    let pairs: Punctuated<VariantEventAttrKv, Token![,]> =
        attr.parse_args_with(Punctuated::<VariantEventAttrKv, Token![,]>::parse_terminated)?;

    for kv in pairs {
        match kv.key.to_string().as_str() {
            "event_type" => {
                let Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(lit),
                    ..
                }) = kv.value
                else {
                    return Err(syn::Error::new(
                        kv.value.span(),
                        "expected string literal for 'event_type'",
                    ));
                };
                if lit.value().is_empty() {
                    return Err(syn::Error::new(lit.span(), "'event_type' must not be empty"));
                }
                if ty.replace(lit).is_some() {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "duplicate key 'event_type' in attribute",
                    ));
                }
            }
            "event_version" => {
                let Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(lit),
                    ..
                }) = kv.value
                else {
                    return Err(syn::Error::new(
                        kv.value.span(),
                        "expected integer literal for 'event_version'",
                    ));
                };
                if version.replace(lit).is_some() {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "duplicate key 'event_version' in attribute",
                    ));
                }
            }
            _ => {
                return Err(syn::Error::new(
                    kv.key.span(),
                    "unknown key; expected 'event_type' | 'event_version'",
                ));
            }
        }
    }

    Ok(VariantEventAttrConfig { ty, version })
}

struct VariantEventAttrKv {
    key: Ident,
    #[allow(dead_code)]
    eq: Token![=],
    value: Expr,
}

impl Parse for VariantEventAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self {
            key: input.parse()?,
            eq: input.parse()?,
            value: input.parse()?,
        })
    }
}

// 枚举级配置：默认事件版本号
struct ChangeEventAttrConfig {
    version: Option<syn::LitInt>,
}

impl Parse for ChangeEventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut version: Option<syn::LitInt> = None;

        if input.is_empty() {
            return Ok(Self { version });
        }

        let pairs: Punctuated<syn::ExprAssign, Token![,]> =
            Punctuated::<syn::ExprAssign, Token![,]>::parse_terminated(input)?;

        for assign in pairs.into_iter() {
            let key_ident = match *assign.left {
                syn::Expr::Path(p) if p.path.segments.len() == 1 => {
                    p.path.segments[0].ident.clone()
                }
                other => return Err(syn::Error::new(other.span(), "invalid attribute key")),
            };
            match key_ident.to_string().as_str() {
                "version" => {
                    let lit: syn::LitInt = syn::parse2(assign.right.to_token_stream())?;
                    if version.replace(lit).is_some() {
                        return Err(syn::Error::new(
                            key_ident.span(),
                            "duplicate key 'version' in attribute",
                        ));
                    }
                }
                _ => {
                    return Err(syn::Error::new(
                        key_ident.span(),
                        "unknown key; expected 'version'",
                    ));
                }
            }
        }

        Ok(Self { version })
    }
}
