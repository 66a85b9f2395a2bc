extern crate proc_macro;

use proc_macro::{Delimiter, TokenStream, TokenTree};

/// Derives `FromYaml` for a struct by reading each declared field out of a
/// `YamlValue::Map` and falling back to `Self::default()` when the key is
/// absent. The struct must implement `Default`.
#[proc_macro_derive(FromYaml)]
pub fn derive_from_yaml(input: TokenStream) -> TokenStream {
    let struct_name = match extract_struct_name(input.clone()) {
        Some(name) => name,
        None => return quote_error("failed to extract struct name"),
    };

    let fields = match extract_struct_fields(input) {
        Some(f) if !f.is_empty() => f,
        _ => return quote_error("failed to extract struct fields"),
    };

    let arms = generate_field_inits(&fields);
    let code = format_impl_code(&struct_name, &arms);

    code.parse().unwrap_or_else(|_| quote_error("generated code was invalid"))
}

fn extract_struct_name(input: TokenStream) -> Option<String> {
    let mut tokens = input.into_iter();
    while let Some(token) = tokens.next() {
        if let TokenTree::Ident(ident) = token {
            if ident.to_string() == "struct" {
                if let Some(TokenTree::Ident(name)) = tokens.next() {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

fn extract_struct_fields(input: TokenStream) -> Option<Vec<String>> {
    for token in input.into_iter() {
        if let TokenTree::Group(group) = token {
            if group.delimiter() == Delimiter::Brace {
                let mut fields = Vec::new();
                parse_field_names(group.stream(), &mut fields);
                return Some(fields);
            }
        }
    }
    None
}

fn parse_field_names(group_stream: TokenStream, fields: &mut Vec<String>) {
    let mut group_iter = group_stream.into_iter();
    let mut last_ident = String::new();

    while let Some(inner_token) = group_iter.next() {
        match inner_token {
            TokenTree::Ident(ident) => {
                let s = ident.to_string();
                if s != "pub" {
                    last_ident = s;
                }
            }
            TokenTree::Punct(punct) if punct.as_char() == ':' => {
                if !last_ident.is_empty() {
                    fields.push(last_ident.clone());
                    last_ident.clear();
                }
                skip_to_comma(&mut group_iter);
            }
            _ => {}
        }
    }
}

/// Skips the field's type tokens up to its trailing comma. Angle brackets
/// around generic arguments (`HashMap<u16, String>`) are plain `Punct`
/// tokens, not a `Group`, so a bare comma-and-depth count is needed to
/// avoid stopping at a comma that separates generic parameters.
fn skip_to_comma(iter: &mut impl Iterator<Item = TokenTree>) {
    let mut angle_depth = 0i32;
    for token in iter.by_ref() {
        match token {
            TokenTree::Punct(p) if p.as_char() == '<' => angle_depth += 1,
            TokenTree::Punct(p) if p.as_char() == '>' => angle_depth -= 1,
            TokenTree::Punct(p) if p.as_char() == ',' && angle_depth <= 0 => break,
            _ => {}
        }
    }
}

fn generate_field_inits(fields: &[String]) -> String {
    let mut arms = String::new();
    for field in fields {
        arms.push_str(&format!(
            "{field}: match value.get(\"{field}\") {{
    Some(__v) => yaml_lite::FromYaml::from_yaml(__v)?,
    None => __defaults.{field},
}},\n",
            field = field,
        ));
    }
    arms
}

fn format_impl_code(struct_name: &str, arms: &str) -> String {
    format!(
        "impl yaml_lite::FromYaml for {struct_name} {{
    fn from_yaml(value: &yaml_lite::YamlValue) -> ::std::result::Result<Self, yaml_lite::YamlError> {{
        let __defaults = Self::default();
        Ok(Self {{
            {arms}
        }})
    }}
}}",
        struct_name = struct_name,
        arms = arms,
    )
}

fn quote_error(msg: &str) -> TokenStream {
    format!("compile_error!(\"FromYaml derive error: {}\");", msg)
        .parse()
        .unwrap()
}
