use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::Parse, parse::ParseStream, parse_macro_input, Ident, ItemStruct, LitStr, Token,
};

struct ModuleArgs {
    id: Option<LitStr>,
    dependencies: Vec<LitStr>,
}

impl Parse for ModuleArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut id: Option<LitStr> = None;
        let mut dependencies: Option<Vec<LitStr>> = None;

        while !input.is_empty() {
            let name: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            if name == "id" {
                if id.is_some() {
                    return Err(syn::Error::new(name.span(), "duplicate `id`"));
                }
                let lit: LitStr = input.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new(lit.span(), "module id must not be empty"));
                }
                id = Some(lit);
            } else if name == "dependencies" {
                if dependencies.is_some() {
                    return Err(syn::Error::new(name.span(), "duplicate `dependencies`"));
                }
                // Parse array: ["a", "b", ...]
                let content;
                syn::bracketed!(content in input);
                let items = content.parse_terminated(<LitStr as Parse>::parse, Token![,])?;
                dependencies = Some(items.into_iter().collect());
            } else {
                return Err(syn::Error::new(
                    name.span(),
                    "unknown module attribute, expected `id` or `dependencies`",
                ));
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(ModuleArgs {
            id,
            dependencies: dependencies.unwrap_or_default(),
        })
    }
}

pub fn module_attribute(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ModuleArgs);
    let input = parse_macro_input!(item as ItemStruct);
    let expanded = generate_module_impl(&args, &input);

    TokenStream::from(expanded)
}

fn generate_module_impl(args: &ModuleArgs, input: &ItemStruct) -> TokenStream2 {
    let module_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Without an explicit id the struct name is used.
    let id = match &args.id {
        Some(lit) => lit.clone(),
        None => LitStr::new(&module_name.to_string(), module_name.span()),
    };
    let dependencies = &args.dependencies;

    quote! {
        #input

        impl #impl_generics ::modstrap::ModuleMetadata for #module_name #ty_generics #where_clause {
            const ID: &'static str = #id;
            const DEPENDENCIES: &'static [&'static str] = &[#(#dependencies),*];
        }
    }
}
