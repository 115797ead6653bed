/// Parse string attribute from macro arguments
pub fn parse_string_attribute(attr_name: &str, meta: &syn::Meta) -> syn::Result<Option<String>> {
    match meta {
        syn::Meta::NameValue(nv) if nv.path.is_ident(attr_name) => {
            if let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit_str),
                ..
            }) = &nv.value
            {
                Ok(Some(lit_str.value()))
            } else {
                Err(syn::Error::new_spanned(
                    &nv.value,
                    format!("{} must be a string literal", attr_name),
                ))
            }
        }
        _ => Ok(None),
    }
}

/// Parse an `i32` attribute such as `ordinal = -5`
pub fn parse_i32_attribute(attr_name: &str, meta: &syn::Meta) -> syn::Result<Option<i32>> {
    let syn::Meta::NameValue(nv) = meta else {
        return Ok(None);
    };
    if !nv.path.is_ident(attr_name) {
        return Ok(None);
    }
    let (negative, lit) = match &nv.value {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(i),
            ..
        }) => (false, i),
        syn::Expr::Unary(syn::ExprUnary {
            op: syn::UnOp::Neg(_),
            expr,
            ..
        }) => match expr.as_ref() {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(i),
                ..
            }) => (true, i),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    format!("{} must be an integer literal", attr_name),
                ))
            }
        },
        other => {
            return Err(syn::Error::new_spanned(
                other,
                format!("{} must be an integer literal", attr_name),
            ))
        }
    };
    let value: i32 = lit.base10_parse()?;
    Ok(Some(if negative { -value } else { value }))
}

/// Parse `attr = [a, b, c]` into the listed identifiers
pub fn parse_ident_list_attribute(
    attr_name: &str,
    meta: &syn::Meta,
) -> syn::Result<Option<Vec<syn::Ident>>> {
    let syn::Meta::NameValue(nv) = meta else {
        return Ok(None);
    };
    if !nv.path.is_ident(attr_name) {
        return Ok(None);
    }
    let syn::Expr::Array(arr) = &nv.value else {
        return Err(syn::Error::new_spanned(
            &nv.value,
            format!("{} must be a list like [a, b]", attr_name),
        ));
    };
    arr.elems
        .iter()
        .map(|e| {
            let ident = match e {
                syn::Expr::Path(p) => p.path.get_ident().cloned(),
                _ => None,
            };
            ident.ok_or_else(|| {
                syn::Error::new_spanned(
                    e,
                    format!("{} entries must be bare identifiers", attr_name),
                )
            })
        })
        .collect::<syn::Result<Vec<_>>>()
        .map(Some)
}

/// Closest candidate by Jaro-Winkler similarity, if reasonably close
pub fn suggest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, strsim::jaro_winkler(input, c)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}
