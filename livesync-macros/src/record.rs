use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Ident, Item, LitStr, Result, Token, Type, parenthesized, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

/// #[record] 宏实现
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as RecordAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[record] only on struct")
                .to_compile_error()
                .into();
        }
    };

    match generate(&cfg, &mut st) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate(cfg: &RecordAttrConfig, st: &mut syn::ItemStruct) -> Result<proc_macro2::TokenStream> {
    let span = st.span();
    let table = cfg
        .table
        .as_ref()
        .ok_or_else(|| syn::Error::new(span, "#[record] requires `table = \"...\"`"))?;
    if cfg.order_by.is_empty() {
        return Err(syn::Error::new(span, "#[record] requires `order_by(field, ...)`"));
    }

    let syn::Fields::Named(fields_named) = &st.fields else {
        return Err(syn::Error::new(span, "#[record] only supports named-field struct"));
    };

    let field_type = |name: &Ident| -> Result<Type> {
        fields_named
            .named
            .iter()
            .find(|f| f.ident.as_ref() == Some(name))
            .map(|f| f.ty.clone())
            .ok_or_else(|| syn::Error::new(name.span(), format!("unknown field `{name}`")))
    };

    if !fields_named
        .named
        .iter()
        .any(|f| f.ident.as_ref().is_some_and(|i| i == "id"))
    {
        return Err(syn::Error::new(span, "#[record] requires an `id: String` field"));
    }

    // 排序键：单字段直接使用其类型，多字段组成元组
    let order_fields = &cfg.order_by;
    let order_types = order_fields
        .iter()
        .map(&field_type)
        .collect::<Result<Vec<_>>>()?;
    let (sort_ty, sort_expr) = if order_fields.len() == 1 {
        let ty = &order_types[0];
        let f = &order_fields[0];
        (quote! { #ty }, quote! { ::std::clone::Clone::clone(&self.#f) })
    } else {
        (
            quote! { ( #(#order_types,)* ) },
            quote! { ( #(::std::clone::Clone::clone(&self.#order_fields),)* ) },
        )
    };

    let columns = cfg.columns.as_ref().map(|c| {
        quote! { const COLUMNS: &'static str = #c; }
    });

    let parent = match &cfg.parent {
        Some(p) => {
            field_type(p)?;
            let column = p.to_string();
            quote! {
                const PARENT_COLUMN: ::std::option::Option<&'static str> =
                    ::std::option::Option::Some(#column);
            }
        }
        None => quote! {},
    };
    let parent_fn = cfg.parent.as_ref().map(|p| {
        quote! {
            fn parent_id(&self) -> ::std::option::Option<&str> {
                ::livesync_domain::record::ForeignKey::key(&self.#p)
            }
        }
    });

    let required = cfg.required.iter().map(|r| r.to_string());
    let order_columns = order_fields.iter().map(|f| f.to_string());

    let mut hydrated_checks = Vec::new();
    for item in &cfg.enriched {
        field_type(&item.name)?;
        let embed = &item.name;
        match &item.paired {
            Some(fk) => {
                field_type(fk)?;
                hydrated_checks.push(quote! {
                    ::livesync_domain::record::embed_resolved(&self.#fk, &self.#embed)
                });
            }
            None => hydrated_checks.push(quote! { self.#embed.is_some() }),
        }
    }
    let hydrated_fn = hydrated_checks
        .into_iter()
        .reduce(|acc, check| quote! { #acc && #check })
        .map(|expr| {
            quote! {
                fn is_hydrated(&self) -> bool {
                    #expr
                }
            }
        });

    apply_derives(
        &mut st.attrs,
        vec![
            syn::parse_quote!(Debug),
            syn::parse_quote!(Clone),
            syn::parse_quote!(PartialEq),
            syn::parse_quote!(serde::Serialize),
            syn::parse_quote!(serde::Deserialize),
        ],
    );

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    Ok(quote! {
        #st

        impl #impl_generics ::livesync_domain::record::Record for #ident #ty_generics #where_clause {
            const TABLE: &'static str = #table;
            #columns
            #parent
            const REQUIRED: &'static [&'static str] = &[#(#required),*];
            const ORDER_BY: &'static [&'static str] = &[#(#order_columns),*];

            type SortKey = #sort_ty;

            fn id(&self) -> &str {
                &self.id
            }

            fn sort_key(&self) -> Self::SortKey {
                #sort_expr
            }

            #parent_fn
            #hydrated_fn
        }
    })
}

// -------- parsing --------

#[derive(Default)]
struct RecordAttrConfig {
    table: Option<LitStr>,
    columns: Option<LitStr>,
    parent: Option<Ident>,
    order_by: Vec<Ident>,
    required: Vec<Ident>,
    enriched: Vec<ListItem>,
}

impl Parse for RecordAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self::default();
        let args: Punctuated<RecordArg, Token![,]> = Punctuated::parse_terminated(input)?;

        for arg in args {
            match arg {
                RecordArg::Str { key, value } if key == "table" => cfg.table = Some(value),
                RecordArg::Str { key, value } if key == "columns" => cfg.columns = Some(value),
                RecordArg::Field { key, value } if key == "parent" => cfg.parent = Some(value),
                RecordArg::List { key, items } if key == "order_by" => {
                    cfg.order_by = plain_idents(&key, items)?;
                }
                RecordArg::List { key, items } if key == "required" => {
                    cfg.required = plain_idents(&key, items)?;
                }
                RecordArg::List { key, items } if key == "enriched" => {
                    cfg.enriched = items.into_iter().collect();
                }
                RecordArg::Str { key, .. }
                | RecordArg::Field { key, .. }
                | RecordArg::List { key, .. } => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unsupported #[record] argument `{key}`"),
                    ));
                }
            }
        }

        Ok(cfg)
    }
}

fn plain_idents(key: &Ident, items: Punctuated<ListItem, Token![,]>) -> Result<Vec<Ident>> {
    items
        .into_iter()
        .map(|item| match item.paired {
            None => Ok(item.name),
            Some(_) => Err(syn::Error::new(
                item.name.span(),
                format!("`{key}` expects plain field names"),
            )),
        })
        .collect()
}

enum RecordArg {
    Str {
        key: Ident,
        value: LitStr,
    },
    Field {
        key: Ident,
        value: Ident,
    },
    List {
        key: Ident,
        items: Punctuated<ListItem, Token![,]>,
    },
}

impl Parse for RecordArg {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;

        if input.peek(syn::token::Paren) {
            let content;
            parenthesized!(content in input);
            let items = content.parse_terminated(ListItem::parse, Token![,])?;
            return Ok(RecordArg::List { key, items });
        }

        input.parse::<Token![=]>()?;
        if input.peek(LitStr) {
            Ok(RecordArg::Str {
                key,
                value: input.parse()?,
            })
        } else {
            Ok(RecordArg::Field {
                key,
                value: input.parse()?,
            })
        }
    }
}

struct ListItem {
    name: Ident,
    paired: Option<Ident>,
}

impl Parse for ListItem {
    fn parse(input: ParseStream) -> Result<Self> {
        let name: Ident = input.parse()?;
        let paired = if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Some(input.parse()?)
        } else {
            None
        };
        Ok(Self { name, paired })
    }
}
