use darling::{ast, FromDeriveInput};
use proc_macro::{self, TokenStream};
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput};

#[derive(darling::FromField)]
#[darling(attributes(ammo_orm))]
struct EntityField {
    ident: Option<syn::Ident>,
    ty: syn::Type,

    #[darling(default)]
    primary: bool,
    #[darling(default)]
    unique: bool,
    #[darling(default)]
    auto_increment: bool,
    #[darling(default)]
    column_type: Option<String>,
}

#[derive(darling::FromDeriveInput)]
#[darling(attributes(ammo_orm), supports(struct_named))]
struct EntityMacroInput {
    ident: syn::Ident,
    vis: syn::Visibility,
    generics: syn::Generics,
    data: ast::Data<(), EntityField>,
}

#[derive(darling::FromVariant)]
#[darling(attributes(ammo_orm))]
struct EnumerationVariant {
    ident: syn::Ident,
}

#[derive(darling::FromDeriveInput)]
#[darling(attributes(ammo_orm), supports(enum_unit))]
struct EnumerationMacroInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: ast::Data<EnumerationVariant, ()>,
}

#[derive(darling::FromDeriveInput)]
#[darling(attributes(ammo_orm))]
struct AdaptedMacroInput {
    ident: syn::Ident,
    generics: syn::Generics,
}

fn reject_generics(generics: &syn::Generics) -> Result<(), TokenStream> {
    if generics.params.is_empty() {
        Ok(())
    } else {
        Err(
            syn::Error::new_spanned(generics, "ammo_orm derives don't support generic types")
                .to_compile_error()
                .into(),
        )
    }
}

/// The attribute name of a field: its identifier without any `r#`.
fn attribute_name(ident: &syn::Ident) -> String {
    let s = ident.to_string();
    s.strip_prefix("r#").map(str::to_string).unwrap_or(s)
}

#[proc_macro_derive(Entity, attributes(ammo_orm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = parse_macro_input!(input);
    let input = match EntityMacroInput::from_derive_input(&derive_input) {
        Err(e) => return e.write_errors().into(),
        Ok(x) => x,
    };

    let EntityMacroInput {
        ident,
        vis,
        generics,
        data,
    } = input;

    if let Err(e) = reject_generics(&generics) {
        return e;
    }

    let fields = match data {
        ast::Data::Struct(f) => f.fields,
        ast::Data::Enum(_) => {
            return syn::Error::new_spanned(&ident, "Entity can only be derived for structs")
                .to_compile_error()
                .into()
        }
    };

    let mut decls: Vec<TokenStream2> = vec![];
    let mut getters: Vec<TokenStream2> = vec![];
    let mut setters: Vec<TokenStream2> = vec![];
    let mut handles: Vec<TokenStream2> = vec![];

    for field in fields {
        // Named structs only, so every field has an identifier.
        let field_ident = match field.ident {
            Some(i) => i,
            None => continue,
        };
        let ty = field.ty;
        let name = attribute_name(&field_ident);
        let const_ident = format_ident!("{}", name.to_uppercase());

        let mut decl = quote! {
            ::ammo_orm::AttributeDecl::new(#name, <#ty as ::ammo_orm::Column>::value_type())
        };
        if field.primary {
            decl = quote! { #decl.primary() };
        }
        if field.unique {
            decl = quote! { #decl.unique() };
        }
        if field.auto_increment {
            decl = quote! { #decl.auto_increment() };
        }
        if let Some(ct) = field.column_type {
            decl = quote! { #decl.column_type(#ct) };
        }
        decls.push(decl);

        getters.push(quote! {
            #name => Some(::ammo_orm::Column::to_value(&self.#field_ident)),
        });
        setters.push(quote! {
            #name => {
                self.#field_ident = <#ty as ::ammo_orm::Column>::from_value(value)?;
                Ok(true)
            }
        });
        handles.push(quote! {
            #vis const #const_ident: ::ammo_orm::Field<#ident, #ty> = {
                fn get(e: &#ident) -> &#ty {
                    &e.#field_ident
                }
                fn set(e: &mut #ident, v: #ty) {
                    e.#field_ident = v;
                }
                ::ammo_orm::Field::new(#name, get, set)
            };
        });
    }

    let out = quote! {
        impl ::ammo_orm::Entity for #ident {
            const ENTITY_NAME: &'static str = stringify!(#ident);

            fn attributes() -> Vec<::ammo_orm::AttributeDecl> {
                vec![#(#decls),*]
            }

            fn get_value(&self, attribute: &str) -> Option<::ammo_orm::Value> {
                match attribute {
                    #(#getters)*
                    _ => None,
                }
            }

            fn set_value(
                &mut self,
                attribute: &str,
                value: ::ammo_orm::Value,
            ) -> Result<bool, ::ammo_orm::DecodeError> {
                match attribute {
                    #(#setters)*
                    _ => Ok(false),
                }
            }
        }

        impl #ident {
            #(#handles)*
        }
    };

    out.into()
}

#[proc_macro_derive(Enumeration, attributes(ammo_orm))]
pub fn derive_enumeration(input: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = parse_macro_input!(input);
    let input = match EnumerationMacroInput::from_derive_input(&derive_input) {
        Err(e) => return e.write_errors().into(),
        Ok(x) => x,
    };

    let EnumerationMacroInput {
        ident,
        generics,
        data,
    } = input;

    if let Err(e) = reject_generics(&generics) {
        return e;
    }

    let variants = match data {
        ast::Data::Enum(v) if !v.is_empty() => v,
        _ => {
            return syn::Error::new_spanned(
                &ident,
                "Enumeration needs an enum with at least one variant",
            )
            .to_compile_error()
            .into()
        }
    };

    let names = variants
        .iter()
        .map(|v| v.ident.to_string())
        .collect::<Vec<_>>();
    let variant_idents = variants.iter().map(|v| &v.ident).collect::<Vec<_>>();

    let out = quote! {
        impl ::ammo_orm::Enumeration for #ident {
            const NAME: &'static str = stringify!(#ident);

            fn variant_name(&self) -> &'static str {
                match self {
                    #(#ident::#variant_idents => #names,)*
                }
            }

            fn from_variant_name(name: &str) -> Option<Self> {
                match name {
                    #(#names => Some(#ident::#variant_idents),)*
                    _ => None,
                }
            }
        }

        impl ::ammo_orm::Column for #ident {
            fn value_type() -> ::ammo_orm::ValueType {
                ::ammo_orm::ValueType::Enum(<Self as ::ammo_orm::Enumeration>::NAME)
            }

            fn to_value(&self) -> ::ammo_orm::Value {
                ::ammo_orm::enumeration_to_value(self)
            }

            fn from_value(value: ::ammo_orm::Value) -> Result<Self, ::ammo_orm::DecodeError> {
                ::ammo_orm::enumeration_from_value(value)
            }
        }
    };

    out.into()
}

/// For types implementing `ammo_orm::Adapt`: stores them as their adapted text.
#[proc_macro_derive(Adapted, attributes(ammo_orm))]
pub fn derive_adapted(input: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = parse_macro_input!(input);
    let input = match AdaptedMacroInput::from_derive_input(&derive_input) {
        Err(e) => return e.write_errors().into(),
        Ok(x) => x,
    };

    let AdaptedMacroInput { ident, generics } = input;
    if let Err(e) = reject_generics(&generics) {
        return e;
    }

    let out = quote! {
        impl ::ammo_orm::Column for #ident {
            fn value_type() -> ::ammo_orm::ValueType {
                ::ammo_orm::ValueType::Adapted(stringify!(#ident))
            }

            fn to_value(&self) -> ::ammo_orm::Value {
                ::ammo_orm::adapted_to_value(stringify!(#ident), self)
            }

            fn from_value(value: ::ammo_orm::Value) -> Result<Self, ::ammo_orm::DecodeError> {
                ::ammo_orm::adapted_from_value(stringify!(#ident), value)
            }
        }
    };

    out.into()
}
