use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::Parse, parse::ParseStream, parse_macro_input, parse_quote, ImplItem, ItemImpl, LitInt,
    LitStr, Token, Type,
};

/// A failure type accepted by the handler: a type path or a verbatim type name
enum ExceptionItem {
    Named(LitStr),
    Type(Type),
}

impl Parse for ExceptionItem {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            Ok(ExceptionItem::Named(input.parse()?))
        } else {
            Ok(ExceptionItem::Type(input.parse()?))
        }
    }
}

struct HandlerArgs {
    name: Option<LitStr>,
    statuses: Vec<LitInt>,
    exceptions: Vec<ExceptionItem>,
}

impl Parse for HandlerArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut name = None;
        let mut statuses = Vec::new();
        let mut exceptions = Vec::new();

        while !input.is_empty() {
            let key: syn::Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            if key == "name" {
                name = Some(input.parse()?);
            } else if key == "status" {
                // Parse array: [404, 410, ...]
                let content;
                syn::bracketed!(content in input);
                let items = content.parse_terminated(LitInt::parse, Token![,])?;
                statuses = items.into_iter().collect();
            } else if key == "exceptions" {
                let content;
                syn::bracketed!(content in input);
                let items = content.parse_terminated(ExceptionItem::parse, Token![,])?;
                exceptions = items.into_iter().collect();
            } else {
                return Err(syn::Error::new(
                    key.span(),
                    format!(
                        "unknown error_handler argument `{}`, expected `name`, `status` or `exceptions`",
                        key
                    ),
                ));
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(HandlerArgs {
            name,
            statuses,
            exceptions,
        })
    }
}

pub fn error_handler_attribute(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as HandlerArgs);
    let mut input = parse_macro_input!(item as ItemImpl);

    match generate_handler_methods(&args, &mut input) {
        Ok(()) => TokenStream::from(quote! { #input }),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_handler_methods(args: &HandlerArgs, input: &mut ItemImpl) -> syn::Result<()> {
    if input.trait_.is_none() {
        return Err(syn::Error::new_spanned(
            &input.self_ty,
            "#[error_handler] must be applied to an `impl ErrorHandler for ...` block",
        ));
    }

    // Methods written by hand win over generated ones
    let defined: Vec<String> = input
        .items
        .iter()
        .filter_map(|item| match item {
            ImplItem::Fn(method) => Some(method.sig.ident.to_string()),
            _ => None,
        })
        .collect();
    let is_defined = |name: &str| defined.iter().any(|d| d == name);

    let statuses = args
        .statuses
        .iter()
        .map(|lit| lit.base10_parse::<u16>())
        .collect::<syn::Result<Vec<_>>>()?;

    let type_names: Vec<TokenStream2> = args
        .exceptions
        .iter()
        .map(|item| match item {
            ExceptionItem::Named(lit) => quote!(#lit),
            ExceptionItem::Type(ty) => quote!(::std::any::type_name::<#ty>()),
        })
        .collect();

    let self_ty = &input.self_ty;
    let name = match &args.name {
        Some(name) => quote!(#name),
        None => {
            let type_name = quote!(#self_ty).to_string().replace(' ', "");
            quote!(#type_name)
        }
    };

    let mut generated: Vec<ImplItem> = Vec::new();

    if !statuses.is_empty() && !is_defined("can_handle_status") {
        generated.push(parse_quote! {
            fn can_handle_status(&self, status: u16) -> bool {
                matches!(status, #(#statuses)|*)
            }
        });
    }

    if !type_names.is_empty() && !is_defined("can_handle_exception") {
        generated.push(parse_quote! {
            fn can_handle_exception(&self, type_name: &str) -> bool {
                [#(#type_names),*]
                    .iter()
                    .any(|candidate| *candidate == type_name)
            }
        });
    }

    if !is_defined("identify") {
        generated.push(parse_quote! {
            fn identify(&self) -> &str {
                #name
            }
        });
    }

    input.items.extend(generated);
    Ok(())
}
