//! Parse schema DSL source into AST using PEST.

use crate::ast::*;
use crate::slot::SchemaError;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/// Parse schema source into AST. Names are not resolved here; see [`ResolvedSchema`].
pub fn parse(source: &str) -> Result<Schema, SchemaError> {
    let pairs = SchemaParser::parse(Rule::schema, source).map_err(|e| SchemaError::Parse(e.to_string()))?;
    let pair = pairs
        .into_iter()
        .next()
        .ok_or_else(|| SchemaError::Parse("Empty parse".to_string()))?;
    build_schema(pair).map_err(SchemaError::Parse)
}

fn build_schema(pair: Pair<'_>) -> Result<Schema, String> {
    let mut schema = Schema::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::version_decl => {
                if schema.version.is_some() {
                    return Err("version declared more than once".to_string());
                }
                let lit = decl_body(inner).next().ok_or("version: missing string")?;
                schema.version = Some(unquote(lit.as_str()).to_string());
            }
            Rule::primitive_decl => {
                let name = decl_body(inner).next().ok_or("primitive: missing name")?;
                schema.datatypes.push(DatatypeSection {
                    name: name.as_str().to_string(),
                    kind: DatatypeKind::Primitive,
                });
            }
            Rule::composite_decl => schema.datatypes.push(build_composite(inner)?),
            Rule::segment_decl => schema.segments.push(build_segment(inner)?),
            Rule::group_decl => schema.groups.push(build_group(inner)?),
            Rule::message_decl => schema.messages.push(build_group(inner)?),
            _ => {}
        }
    }
    Ok(schema)
}

fn build_composite(pair: Pair<'_>) -> Result<DatatypeSection, String> {
    let mut it = decl_body(pair);
    let name = it.next().ok_or("composite: missing name")?.as_str().to_string();
    let mut components = Vec::new();
    for inner in it {
        if inner.as_rule() != Rule::component_decl {
            continue;
        }
        let mut parts = inner.into_inner();
        let comp_name = parts.next().ok_or("component: missing name")?;
        let type_name = parts.next().ok_or("component: missing type")?;
        let table_id = match parts.next() {
            Some(t) if t.as_rule() == Rule::table_attr => Some(attr_u32(t)?),
            _ => None,
        };
        components.push(ComponentDecl {
            name: comp_name.as_str().to_string(),
            type_name: type_name.as_str().to_string(),
            table_id,
        });
    }
    Ok(DatatypeSection {
        name,
        kind: DatatypeKind::Composite(components),
    })
}

fn build_segment(pair: Pair<'_>) -> Result<SegmentSection, String> {
    let mut it = decl_body(pair);
    let name = it.next().ok_or("segment: missing name")?.as_str().to_string();
    let mut fields = Vec::new();
    for inner in it {
        if inner.as_rule() == Rule::field_decl {
            fields.push(build_field(inner).map_err(|e| format!("{}: {}", name, e))?);
        }
    }
    Ok(SegmentSection { name, fields })
}

fn build_field(pair: Pair<'_>) -> Result<FieldDecl, String> {
    let mut it = pair.into_inner();
    let position = parse_num(it.next().ok_or("field: missing position")?.as_str())?;
    let type_name = it.next().ok_or("field: missing type")?.as_str().to_string();
    let mut field = FieldDecl {
        position,
        type_name,
        required: false,
        max_reps: 1,
        max_length: 0,
        table_id: None,
        label: None,
        strict: false,
    };
    for attr in it {
        match attr.as_rule() {
            Rule::required_kw => field.required = true,
            Rule::optional_kw => field.required = false,
            Rule::repeating_kw => field.max_reps = 0,
            Rule::strict_kw => field.strict = true,
            Rule::reps_attr => field.max_reps = attr_num(attr)?,
            Rule::len_attr => field.max_length = attr_num(attr)?,
            Rule::table_attr => field.table_id = Some(attr_u32(attr)?),
            Rule::string_literal => field.label = Some(unquote(attr.as_str()).to_string()),
            r => return Err(format!("field {}: unexpected {:?}", position, r)),
        }
    }
    Ok(field)
}

fn build_group(pair: Pair<'_>) -> Result<GroupSection, String> {
    let mut it = decl_body(pair);
    let name = it.next().ok_or("group: missing name")?.as_str().to_string();
    let mut children = Vec::new();
    for inner in it {
        if inner.as_rule() == Rule::child_decl {
            children.push(build_child(inner).map_err(|e| format!("{}: {}", name, e))?);
        }
    }
    Ok(GroupSection { name, children })
}

fn build_child(pair: Pair<'_>) -> Result<ChildDecl, String> {
    let mut alias = None;
    let mut target = None;
    let mut child = ChildDecl {
        alias: None,
        target: String::new(),
        required: false,
        repeating: false,
        strict: false,
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::alias => alias = Some(inner.as_str().to_string()),
            Rule::ident => target = Some(inner.as_str().to_string()),
            Rule::required_kw => child.required = true,
            Rule::optional_kw => child.required = false,
            Rule::repeating_kw => child.repeating = true,
            Rule::strict_kw => child.strict = true,
            r => return Err(format!("child: unexpected {:?}", r)),
        }
    }
    child.alias = alias;
    child.target = target.ok_or("child: missing structure name")?;
    Ok(child)
}

/// Inner pairs of a declaration, past its leading keyword.
fn decl_body(pair: Pair<'_>) -> pest::iterators::Pairs<'_, Rule> {
    let mut it = pair.into_inner();
    it.next();
    it
}

/// Number inside `reps(n)`, `len(n)` or `table(n)`.
fn attr_num(pair: Pair<'_>) -> Result<usize, String> {
    let num = pair.into_inner().next().ok_or("attribute: missing number")?;
    parse_num(num.as_str())
}

fn attr_u32(pair: Pair<'_>) -> Result<u32, String> {
    let num = pair.into_inner().next().ok_or("table: missing number")?;
    num.as_str()
        .parse()
        .map_err(|e| format!("table id {}: {}", num.as_str(), e))
}

fn parse_num(s: &str) -> Result<usize, String> {
    s.parse().map_err(|e| format!("number {}: {}", s, e))
}

fn unquote(s: &str) -> &str {
    s.trim_start_matches('"').trim_end_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_attributes() {
        let src = r#"
            version "2.5";
            primitive ST;
            segment ZZZ {
                1: ST required len(4) "Set ID";
                2: ST repeating;
                3: ST reps(3) strict table(7);
            }
        "#;
        let schema = parse(src).expect("parse");
        assert_eq!(schema.version.as_deref(), Some("2.5"));
        let f = &schema.segments[0].fields;
        assert!(f[0].required);
        assert_eq!(f[0].max_length, 4);
        assert_eq!(f[0].max_reps, 1);
        assert_eq!(f[0].label.as_deref(), Some("Set ID"));
        assert_eq!(f[1].max_reps, 0);
        assert_eq!(f[2].max_reps, 3);
        assert!(f[2].strict);
        assert_eq!(f[2].table_id, Some(7));
    }

    #[test]
    fn parses_child_alias() {
        let src = "version \"2.5\"; message ADT_A01 { MSH required; NEXT_OF_KIN: PATIENT repeating strict; }";
        let schema = parse(src).expect("parse");
        let c = &schema.messages[0].children;
        assert_eq!(c[0].slot_name(), "MSH");
        assert!(c[0].required);
        assert_eq!(c[1].alias.as_deref(), Some("NEXT_OF_KIN"));
        assert_eq!(c[1].target, "PATIENT");
        assert_eq!(c[1].slot_name(), "NEXT_OF_KIN");
        assert!(c[1].repeating && c[1].strict);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse("segment {"), Err(SchemaError::Parse(_))));
        assert!(matches!(
            parse("version \"1\"; version \"2\";"),
            Err(SchemaError::Parse(_))
        ));
    }

    #[test]
    fn section_keyword_needs_a_boundary() {
        assert!(parse("version \"2.5\"; primitiveST;").is_err());
        assert!(parse("version \"2.5\"; segmentPID { }").is_err());
        assert!(parse("version\"2.5\";").is_ok());
        let schema = parse("version \"2.5\"; primitive segments; message groupA { }").expect("parse");
        assert_eq!(schema.datatypes[0].name, "segments");
        assert_eq!(schema.messages[0].name, "groupA");
    }
}
