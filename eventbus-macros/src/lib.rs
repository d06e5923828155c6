use proc_macro::TokenStream;
use quote::{ToTokens, quote};
use syn::{
    FnArg, GenericArgument, ImplItem, ImplItemFn, Item, ItemImpl, PathArguments, ReturnType, Type,
    parse_macro_input, spanned::Spanned,
};

mod return_kind;

use return_kind::ReturnKind;

/// 处理器发现宏
/// - 用于固有 `impl` 块，扫描其中标记 `#[handles]` 的方法
/// - 方法签名须为 `fn name(&self, event: &Event) -> ...`
/// - 为目标类型实现 `::eventbus::handler::Subscriber`，每个方法对应一个 `HandlerDescriptor`
/// - 返回类型决定处理器种类：
///   - 无或 `()`：无返回值
///   - `Result<(), E>`：无返回值，可失败
///   - `Result<T, E>`：带返回值，可失败
///   - 其他 `T`：带返回值
#[proc_macro_attribute]
pub fn event_handlers(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::TokenStream::from(attr).span(),
            "#[event_handlers] takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let input = parse_macro_input!(item as Item);
    let mut imp = match input {
        Item::Impl(i) if i.trait_.is_none() => i,
        other => {
            return syn::Error::new(other.span(), "#[event_handlers] only on inherent impl block")
                .to_compile_error()
                .into();
        }
    };

    match expand(&mut imp) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// 标记处理器方法；仅在 `#[event_handlers]` 内有效，由其移除
#[proc_macro_attribute]
pub fn handles(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item2: proc_macro2::TokenStream = item.into();
    let err = syn::Error::new(
        item2.span(),
        "#[handles] must be used inside an #[event_handlers] impl block",
    )
    .to_compile_error();
    quote!(#err #item2).into()
}

fn expand(imp: &mut ItemImpl) -> syn::Result<proc_macro2::TokenStream> {
    let self_ty = imp.self_ty.clone();
    let type_label = self_ty.to_token_stream().to_string().replace(' ', "");

    let mut descriptors = Vec::new();
    let mut errors: Option<syn::Error> = None;

    for item in imp.items.iter_mut() {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        if !take_handles_attr(method) {
            continue;
        }

        match descriptor_for(&type_label, method) {
            Ok(ts) => descriptors.push(ts),
            // 汇总所有错误，一次性报告
            Err(e) => match errors.as_mut() {
                Some(acc) => acc.combine(e),
                None => errors = Some(e),
            },
        }
    }

    if let Some(e) = errors {
        return Err(e);
    }

    let (impl_generics, _, where_clause) = imp.generics.split_for_impl();

    Ok(quote! {
        #imp

        impl #impl_generics ::eventbus::handler::Subscriber for #self_ty #where_clause {
            fn handlers(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::vec::Vec<::eventbus::handler::HandlerDescriptor> {
                ::std::vec![#(#descriptors),*]
            }
        }
    })
}

// 移除 `#[handles]`，返回是否存在
fn take_handles_attr(method: &mut ImplItemFn) -> bool {
    let before = method.attrs.len();
    method.attrs.retain(|a| !a.path().is_ident("handles"));
    method.attrs.len() != before
}

fn descriptor_for(type_label: &str, method: &ImplItemFn) -> syn::Result<proc_macro2::TokenStream> {
    let sig = &method.sig;
    let ident = &sig.ident;

    if let Some(asyncness) = sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "#[handles] methods must be synchronous",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "#[handles] methods cannot be generic",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        Some(other) => {
            return Err(syn::Error::new(
                other.span(),
                "#[handles] methods must take `&self`",
            ));
        }
        None => {
            return Err(syn::Error::new(
                sig.span(),
                "#[handles] methods must take `&self`",
            ));
        }
    }

    let event_ty = match (inputs.next(), inputs.next()) {
        (Some(FnArg::Typed(pt)), None) => match pt.ty.as_ref() {
            Type::Reference(r) if r.mutability.is_none() => r.elem.as_ref().clone(),
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "event parameter must be a shared reference, e.g. `event: &MyEvent`",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                sig.inputs.span(),
                "#[handles] methods take exactly one event parameter after `&self`",
            ));
        }
    };

    let name = format!("{type_label}::{ident}");

    let ts = match ReturnKind::of(&sig.output) {
        ReturnKind::Void => quote! {{
            let this = ::std::sync::Arc::clone(&self);
            ::eventbus::handler::HandlerDescriptor::void::<#event_ty, _>(#name, move |event| {
                this.#ident(event);
                ::core::result::Result::Ok(())
            })
        }},
        ReturnKind::FallibleVoid => quote! {{
            let this = ::std::sync::Arc::clone(&self);
            ::eventbus::handler::HandlerDescriptor::void::<#event_ty, _>(#name, move |event| {
                this.#ident(event).map_err(::core::convert::Into::into)
            })
        }},
        ReturnKind::Fallible(value_ty) => quote! {{
            let this = ::std::sync::Arc::clone(&self);
            ::eventbus::handler::HandlerDescriptor::returning::<#event_ty, #value_ty, _>(#name, move |event| {
                this.#ident(event).map_err(::core::convert::Into::into)
            })
        }},
        ReturnKind::Value(value_ty) => quote! {{
            let this = ::std::sync::Arc::clone(&self);
            ::eventbus::handler::HandlerDescriptor::returning::<#event_ty, #value_ty, _>(#name, move |event| {
                ::core::result::Result::Ok(this.#ident(event))
            })
        }},
    };

    Ok(ts)
}

// `Result<T, ..>` 的成功类型；非 Result 返回 None
fn result_ok_type(ty: &Type) -> Option<&Type> {
    let Type::Path(tp) = ty else {
        return None;
    };
    if tp.qself.is_some() {
        return None;
    }
    let last = tp.path.segments.last()?;
    if last.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|a| match a {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

fn is_unit(ty: &Type) -> bool {
    match ty {
        Type::Tuple(t) => t.elems.is_empty(),
        Type::Paren(p) => is_unit(&p.elem),
        _ => false,
    }
}

fn output_type(output: &ReturnType) -> Option<&Type> {
    match output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some(ty.as_ref()),
    }
}
