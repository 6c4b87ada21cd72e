use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[value_object] 宏实现
/// - 支持结构体（具名或 tuple）与枚举
/// - 合并派生：Default, Clone, (Debug 可控), Serialize, Deserialize, PartialEq, Eq
/// - `ordered = true` 时追加 Copy, PartialOrd, Ord, Hash（用于版本号、标识符等）
/// - 参数：`#[value_object(debug = true|false, ordered = true|false)]`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as ValueObjectAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Default),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(Eq),
    ];

    if cfg.debug.unwrap_or(true) {
        required.insert(0, syn::parse_quote!(Debug));
    }

    if cfg.ordered.unwrap_or(false) {
        required.extend([
            syn::parse_quote!(Copy),
            syn::parse_quote!(PartialOrd),
            syn::parse_quote!(Ord),
            syn::parse_quote!(Hash),
        ]);
    }

    match &mut input {
        Item::Struct(st) => {
            apply_derives(&mut st.attrs, required);
            TokenStream::from(quote! { #st })
        }
        Item::Enum(en) => {
            apply_derives(&mut en.attrs, required);
            TokenStream::from(quote! { #en })
        }
        other => syn::Error::new(other.span(), "#[value_object] only supports struct or enum")
            .to_compile_error()
            .into(),
    }
}

// -------- parsing --------

#[derive(Default)]
struct ValueObjectAttrConfig {
    debug: Option<bool>,
    ordered: Option<bool>,
}

impl Parse for ValueObjectAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self::default();
        if input.is_empty() {
            return Ok(cfg);
        }

        let pairs: Punctuated<ValueObjectAttrKv, Token![,]> =
            Punctuated::parse_terminated(input)?;

        for kv in pairs {
            let slot = match kv.key.to_string().as_str() {
                "debug" => &mut cfg.debug,
                "ordered" => &mut cfg.ordered,
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key in attribute; expected 'debug' | 'ordered'",
                    ));
                }
            };
            if slot.replace(kv.value).is_some() {
                return Err(syn::Error::new(
                    kv.key.span(),
                    format!("duplicate key '{}' in attribute", kv.key),
                ));
            }
        }
        Ok(cfg)
    }
}

struct ValueObjectAttrKv {
    key: syn::Ident,
    value: bool,
}

impl Parse for ValueObjectAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        let expr: syn::Expr = input.parse()?;
        match expr {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Bool(b),
                ..
            }) => Ok(Self {
                key,
                value: b.value(),
            }),
            other => Err(syn::Error::new(
                other.span(),
                format!("expected boolean literal for '{key}'"),
            )),
        }
    }
}
