use crate::constant_pool::{Constant, ConstantPool};
use crate::error::ClassFileError;
use crate::opcodes;

/// Method references that turn a preceding string constant into a class
/// reference when invoked statically.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CrawlTargets {
    /// `java/lang/Class.forName(Ljava/lang/String;)Ljava/lang/Class;`
    pub(crate) for_name: Option<u16>,
    /// The synthetic `class$` helper of the class being parsed.
    pub(crate) class_dollar: Option<u16>,
}

impl CrawlTargets {
    fn matches(&self, method_ref: u16) -> bool {
        self.for_name == Some(method_ref) || self.class_dollar == Some(method_ref)
    }
}

/// Type reference discovered in a method body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CrawlReference {
    /// Internal name from a class constant.
    Class(String),
    /// Dotted name loaded reflectively.
    Reflective(String),
}

/// Walks one `Code` body forward and collects the types it names.
pub(crate) fn crawl(
    code: &[u8],
    pool: &ConstantPool,
    targets: CrawlTargets,
) -> Result<Vec<CrawlReference>, ClassFileError> {
    let mut found = Vec::new();
    let mut last_reference: Option<u16> = None;
    let mut offset = 0;

    while offset < code.len() {
        let opcode = code[offset];
        let length = opcodes::opcode_length(code, offset)?;
        match opcode {
            opcodes::LDC => {
                let index = code[offset + 1] as u16;
                last_reference = Some(index);
                push_class(pool, index, &mut found)?;
            }
            opcodes::LDC_W => {
                let index = read_index(code, offset);
                last_reference = Some(index);
                push_class(pool, index, &mut found)?;
            }
            opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF
            | opcodes::MULTIANEWARRAY => {
                let index = read_index(code, offset);
                found.push(CrawlReference::Class(pool.class_name(index)?.to_string()));
                last_reference = None;
            }
            opcodes::INVOKESTATIC => {
                let method_ref = read_index(code, offset);
                if targets.matches(method_ref) {
                    if let Some(name) = last_reference.and_then(|index| loaded_name(pool, index)) {
                        found.push(CrawlReference::Reflective(name.to_string()));
                    }
                }
                last_reference = None;
            }
            _ => last_reference = None,
        }
        offset += length;
    }

    Ok(found)
}

fn read_index(code: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([code[offset + 1], code[offset + 2]])
}

fn push_class(
    pool: &ConstantPool,
    index: u16,
    found: &mut Vec<CrawlReference>,
) -> Result<(), ClassFileError> {
    if let Constant::Class { name_index } = pool.get(index)? {
        found.push(CrawlReference::Class(pool.utf8(*name_index)?.to_string()));
    }
    Ok(())
}

/// String constant that looks like a qualified class name.
fn loaded_name(pool: &ConstantPool, index: u16) -> Option<&str> {
    let value = pool.string(index).ok()?;
    match value.find('.') {
        Some(dot) if dot > 0 && value != "class" => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::testutil::ClassBuilder;

    fn pool_of(builder: &ClassBuilder) -> ConstantPool {
        let bytes = builder.pool_bytes();
        ConstantPool::parse(&mut Cursor::new(&bytes)).expect("pool")
    }

    #[test]
    fn collects_direct_class_references() {
        let mut builder = ClassBuilder::new("com/acme/Main");
        let created = builder.class("com/acme/Created");
        let cast = builder.class("org/other/Cast");
        let [c1, c2] = created.to_be_bytes();
        let [k1, k2] = cast.to_be_bytes();
        let code = [
            opcodes::NEW, c1, c2, 0x59, // dup
            opcodes::CHECKCAST, k1, k2, 0xb1, // return
        ];
        let pool = pool_of(&builder);

        let found = crawl(&code, &pool, CrawlTargets::default()).expect("crawl");
        assert_eq!(
            found,
            vec![
                CrawlReference::Class("com/acme/Created".to_string()),
                CrawlReference::Class("org/other/Cast".to_string()),
            ]
        );
    }

    #[test]
    fn resolves_for_name_after_string_constant() {
        let mut builder = ClassBuilder::new("com/acme/Main");
        let name = builder.string("org.other.Plugin");
        let for_name = builder.method_ref(
            "java/lang/Class",
            "forName",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        );
        let [f1, f2] = for_name.to_be_bytes();
        let code = [
            opcodes::LDC, name as u8, opcodes::INVOKESTATIC, f1, f2, 0x57, 0xb1,
        ];
        let pool = pool_of(&builder);
        let targets = CrawlTargets {
            for_name: Some(for_name),
            class_dollar: None,
        };

        let found = crawl(&code, &pool, targets).expect("crawl");
        assert_eq!(
            found,
            vec![CrawlReference::Reflective("org.other.Plugin".to_string())]
        );
    }

    #[test]
    fn ignores_string_not_immediately_before_call() {
        let mut builder = ClassBuilder::new("com/acme/Main");
        let name = builder.string("org.other.Plugin");
        let for_name = builder.method_ref(
            "java/lang/Class",
            "forName",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        );
        let [f1, f2] = for_name.to_be_bytes();
        let code = [
            opcodes::LDC, name as u8, 0x00, opcodes::INVOKESTATIC, f1, f2, 0xb1,
        ];
        let pool = pool_of(&builder);
        let targets = CrawlTargets {
            for_name: Some(for_name),
            class_dollar: None,
        };

        assert!(crawl(&code, &pool, targets).expect("crawl").is_empty());
    }

    #[test]
    fn rejects_names_without_package() {
        let mut builder = ClassBuilder::new("com/acme/Main");
        let leading = builder.string(".Hidden");
        let plain = builder.string("class");
        let pool = pool_of(&builder);
        assert_eq!(loaded_name(&pool, leading), None);
        assert_eq!(loaded_name(&pool, plain), None);
    }

    #[test]
    fn truncated_code_is_malformed() {
        let builder = ClassBuilder::new("com/acme/Main");
        let pool = pool_of(&builder);
        assert!(crawl(&[opcodes::NEW, 0x00], &pool, CrawlTargets::default()).is_err());
    }
}
