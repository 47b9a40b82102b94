extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, PatType};

/// Retries an `async fn(&self, ..) -> Result<_, E>` method while it fails with
/// a write conflict.
///
/// The error type must provide `fn is_conflict(&self) -> bool` and the
/// receiver `fn conflict_retries(&self) -> u32`. Arguments are passed to every
/// attempt again, so they have to be `Copy` (references, instants).
#[proc_macro_attribute]
pub fn retry(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);
    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let block = &input_fn.block;
    let fn_name = &input_fn.sig.ident;
    let fn_args = &input_fn.sig.inputs;
    let fn_return = &input_fn.sig.output;

    let arg_list: Vec<_> = fn_args
        .iter()
        .map(|arg| match arg {
            FnArg::Typed(PatType { pat, .. }) => quote! { #pat },
            FnArg::Receiver(_) => quote!(self),
        })
        .collect();

    let attempt_fn_name = quote::format_ident!("{}_attempt", fn_name);
    let gen = quote! {
        async fn #attempt_fn_name(#fn_args) #fn_return {
            #block
        }

        #(#attrs)*
        #vis async fn #fn_name(#fn_args) #fn_return {
            let retries = self.conflict_retries();
            let mut attempt: u32 = 0;
            loop {
                match Self::#attempt_fn_name(#(#arg_list),*).await {
                    Err(err) if err.is_conflict() && attempt < retries => {
                        attempt += 1;
                        log::warn!(
                            "{}: {}; retrying ({}/{})",
                            stringify!(#fn_name),
                            err,
                            attempt,
                            retries
                        );
                    }
                    result => return result,
                }
            }
        }
    };

    TokenStream::from(gen)
}
