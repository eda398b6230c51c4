use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::Token;
use syn::{parse_macro_input, Expr, ExprLit, ItemFn, Lit, Meta};

/// Register a suite definition with the benchgroup runtime.
///
/// The function must have the signature
/// `fn(&mut Suite) -> Result<(), DeclarationError>`. It is registered under its
/// own name unless `name = "..."` is given.
///
/// ```ignore
/// #[benchgroup_macros::suite(name = "collections")]
/// fn collections(suite: &mut Suite) -> Result<(), DeclarationError> {
///     suite.group("vec", |s| s.speed("push", || { let _ = vec![1]; }))
/// }
/// ```
#[proc_macro_attribute]
pub fn suite(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    let fn_name = &input_fn.sig.ident;
    let mut suite_name = fn_name.to_string();

    if input_fn.sig.inputs.len() != 1 {
        return syn::Error::new(
            input_fn.sig.inputs.span(),
            "#[suite] functions take exactly one `&mut Suite` argument",
        )
        .to_compile_error()
        .into();
    }

    if let Some(asyncness) = &input_fn.sig.asyncness {
        return syn::Error::new(asyncness.span(), "#[suite] functions must not be async")
            .to_compile_error()
            .into();
    }

    for arg in args {
        match arg {
            Meta::NameValue(nv) if nv.path.is_ident("name") => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit_str),
                    ..
                }) => suite_name = lit_str.value(),
                other => {
                    return syn::Error::new(other.span(), "expected a string literal, e.g. name = \"collections\"")
                        .to_compile_error()
                        .into();
                }
            },
            other => {
                return syn::Error::new(other.span(), "unknown #[suite] argument, expected `name = \"...\"`")
                    .to_compile_error()
                    .into();
            }
        }
    }

    let expanded = quote! {
        #input_fn

        ::benchgroup_runtime::inventory::submit! {
            ::benchgroup_runtime::registry::SuiteDefinition {
                name: #suite_name,
                module: module_path!(),
                define: #fn_name,
            }
        }
    };

    TokenStream::from(expanded)
}
