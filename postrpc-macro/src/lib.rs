//! # postrpc procedural macros
//!
//! ## `#[procedures]`
//!
//! Turns a trait into a set of remote procedures. It generates:
//! - the trait itself, with every `async fn` desugared to a `Send` future
//! - `postrpc_export`, registering an implementation with a `Router`
//! - an implementation of the trait for `Client`, one typed call per method
//!
//! ### Example
//!
//! ```rust,ignore
//! #[postrpc::procedures]
//! pub trait Calculator {
//!     async fn add(&self, req: &AddReq) -> postrpc::Result<i64>;
//! }
//! ```
//!
//! Methods must have the form
//! `async fn name(&self, req: &Req) -> Result<Rsp>`, where `Req` is
//! deserializable and `Rsp` serializable. Each one is registered under its
//! own name.

use proc_macro::TokenStream;
use quote::quote;
use syn::{FnArg, ItemTrait, ReturnType, TraitItem, Type, parse_macro_input};

const RESERVED: [&str; 2] = ["postrpc_export", "request"];

/// Defines remote procedures from a trait.
///
/// # Panics
///
/// Panics at compile time if:
/// - the trait is generic
/// - a method does not match `async fn name(&self, req: &Req) -> Result<Rsp>`
/// - a method has a default body
/// - a method is named `postrpc_export` or `request` (reserved names)
#[proc_macro_attribute]
pub fn procedures(_attr: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as ItemTrait);

    assert!(
        input.generics.params.is_empty(),
        "procedure traits cannot be generic."
    );

    let trait_ident = &input.ident;
    let trait_name = trait_ident.to_string();
    let trait_attrs = &input.attrs;
    let visibility = &input.vis;
    let colon_token = &input.colon_token;
    let supertraits = &input.supertraits;

    let krate = get_crate_name();

    let mut trait_methods = vec![];
    let mut export_branches = vec![];
    let mut client_methods = vec![];

    for item in &input.items {
        if let TraitItem::Fn(method) = item
            && method.sig.inputs.len() == 2
            && method.sig.asyncness.is_some()
            && method.default.is_none()
            && let Some(receiver) = method.sig.receiver()
            && receiver.reference.is_some()
            && receiver.mutability.is_none()
            && let FnArg::Typed(req_arg) = &method.sig.inputs[1]
            && let Type::Reference(req_ref) = &*req_arg.ty
            && let ReturnType::Type(_, rsp_type) = &method.sig.output
        {
            let method_ident = &method.sig.ident;
            assert!(
                !RESERVED.iter().any(|name| method_ident == name),
                "the function cannot be named `postrpc_export` or `request`!"
            );
            let method_name = method_ident.to_string();
            let method_attrs = &method.attrs;
            let inputs = &method.sig.inputs;
            let req_type = &req_ref.elem;

            trait_methods.push(quote! {
                #(#method_attrs)*
                fn #method_ident(#inputs)
                    -> impl ::std::future::Future<Output = #rsp_type> + ::std::marker::Send;
            });

            client_methods.push(quote! {
                fn #method_ident(&self, req: &#req_type)
                    -> impl ::std::future::Future<Output = #rsp_type> + ::std::marker::Send
                {
                    self.request(#method_name, req)
                }
            });

            export_branches.push(quote! {
                let this = self.clone();
                router.add_typed_method(#method_name, move |req: #req_type| {
                    let this = this.clone();
                    async move { this.#method_ident(&req).await }
                });
            });
        } else if let TraitItem::Fn(method) = item {
            panic!(
                "`{}` should be in the form `async fn func(&self, req: &Req) -> Result<Rsp>` without a body.",
                method.sig.ident
            );
        } else {
            panic!("procedure traits may only contain methods.");
        }
    }

    quote! {
        #(#trait_attrs)*
        #visibility trait #trait_ident #colon_token #supertraits {
            const NAME: &'static str = #trait_name;

            #(#trait_methods)*

            fn postrpc_export(
                self: ::std::sync::Arc<Self>,
                router: &mut #krate::Router,
            )
            where
                Self: ::std::marker::Sized
                    + ::std::marker::Send
                    + ::std::marker::Sync
                    + 'static,
            {
                #(#export_branches)*
            }
        }

        impl #trait_ident for #krate::Client {
            #(#client_methods)*
        }
    }
    .into()
}

/// Path to the postrpc crate as seen from the call site.
///
/// `::postrpc` (or its renamed form) for dependents, `crate` inside postrpc
/// itself.
pub(crate) fn get_crate_name() -> proc_macro2::TokenStream {
    match proc_macro_crate::crate_name("postrpc") {
        Ok(proc_macro_crate::FoundCrate::Name(name)) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote! { ::#ident }
        }
        _ => quote! { crate },
    }
}
