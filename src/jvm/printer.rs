//! Human readable listing of a class, in the spirit of `javap -c -p`

use super::opcodes::{
    mnemonic, NEWARRAY, T_BOOLEAN, T_BYTE, T_CHAR, T_DOUBLE, T_FLOAT, T_INT, T_LONG, T_SHORT,
};
use super::annotations::AnnotationAttribute;
use super::visitor::{
    ClassHeader, ClassVisitor, FieldHeader, FieldVisitor, FrameType, InnerClassEntry,
    MethodHeader, MethodVisitor, RawAttribute,
};
use super::{ConstantValue, Error, Handle, Label, LabelGenerator};

/// Class visitor that renders everything it sees as text
///
/// ```
/// use classweaver::jvm::{ClassReader, Printer, ReaderFlags};
///
/// # fn dump(bytes: &[u8]) -> Result<String, classweaver::jvm::Error> {
/// let reader = ClassReader::new(bytes)?;
/// let mut printer = Printer::new();
/// reader.accept(&mut printer, ReaderFlags::empty())?;
/// Ok(printer.into_output())
/// # }
/// ```
#[derive(Default)]
pub struct Printer {
    output: String,
}

impl Printer {
    pub fn new() -> Printer {
        Printer {
            output: String::new(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }
}

fn writeln(output: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        output.push(' ');
    }
    output.push_str(line);
    output.push('\n');
}

fn annotations(output: &mut String, indent: usize, attribute: &AnnotationAttribute) {
    writeln(output, indent, &format!("// {} {}", attribute.name(), attribute));
}

fn labels(targets: &[Label]) -> String {
    targets
        .iter()
        .map(|label| label.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn frame_types(types: &[FrameType]) -> String {
    types
        .iter()
        .map(|typ| typ.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn array_type_name(code: i32) -> Option<&'static str> {
    let name = match u8::try_from(code).ok()? {
        T_BOOLEAN => "boolean",
        T_CHAR => "char",
        T_FLOAT => "float",
        T_DOUBLE => "double",
        T_BYTE => "byte",
        T_SHORT => "short",
        T_INT => "int",
        T_LONG => "long",
        _ => return None,
    };
    Some(name)
}

impl ClassVisitor for Printer {
    fn visit_header(&mut self, header: &ClassHeader) -> Result<(), Error> {
        writeln(&mut self.output, 0, &format!("// class version {}", header.version));
        writeln(&mut self.output, 0, &format!("// access flags {:?}", header.access));
        if let Some(signature) = &header.signature {
            writeln(&mut self.output, 0, &format!("// signature {}", signature));
        }
        let mut line = format!("class {}", header.name);
        if let Some(super_name) = &header.super_name {
            line.push_str(&format!(" extends {}", super_name));
        }
        if !header.interfaces.is_empty() {
            line.push_str(&format!(" implements {}", header.interfaces.join(", ")));
        }
        line.push_str(" {");
        writeln(&mut self.output, 0, &line);
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        writeln(&mut self.output, 2, &format!("// compiled from {}", source_file));
        Ok(())
    }

    fn visit_outer_class(
        &mut self,
        owner: &str,
        method: Option<(&str, &str)>,
    ) -> Result<(), Error> {
        let line = match method {
            Some((name, descriptor)) => format!("// enclosing method {}.{}{}", owner, name, descriptor),
            None => format!("// enclosing class {}", owner),
        };
        writeln(&mut self.output, 2, &line);
        Ok(())
    }

    fn visit_nest_host(&mut self, host: &str) -> Result<(), Error> {
        writeln(&mut self.output, 2, &format!("// nest host {}", host));
        Ok(())
    }

    fn visit_nest_member(&mut self, member: &str) -> Result<(), Error> {
        writeln(&mut self.output, 2, &format!("// nest member {}", member));
        Ok(())
    }

    fn visit_inner_class(&mut self, inner_class: &InnerClassEntry) -> Result<(), Error> {
        writeln(
            &mut self.output,
            2,
            &format!(
                "// inner class {} outer {} name {} access {:?}",
                inner_class.name,
                inner_class.outer_name.as_deref().unwrap_or("-"),
                inner_class.inner_name.as_deref().unwrap_or("-"),
                inner_class.access,
            ),
        );
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        writeln(
            &mut self.output,
            2,
            &format!("// attribute {} ({} bytes)", attribute.name, attribute.info.len()),
        );
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        annotations(&mut self.output, 2, attribute);
        Ok(())
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        self.output.push('\n');
        let mut line = format!("{:?} {} {}", header.access, header.descriptor, header.name);
        if let Some(value) = &header.constant_value {
            line.push_str(&format!(" = {}", value));
        }
        writeln(&mut self.output, 2, &line);
        if let Some(signature) = &header.signature {
            writeln(&mut self.output, 4, &format!("// signature {}", signature));
        }
        Ok(Some(Box::new(FieldPrinter {
            output: &mut self.output,
        })))
    }

    fn visit_method(
        &mut self,
        header: &MethodHeader,
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        self.output.push('\n');
        let mut line = format!("{:?} {}{}", header.access, header.name, header.descriptor);
        if !header.exceptions.is_empty() {
            line.push_str(&format!(" throws {}", header.exceptions.join(", ")));
        }
        writeln(&mut self.output, 2, &line);
        if let Some(signature) = &header.signature {
            writeln(&mut self.output, 4, &format!("// signature {}", signature));
        }
        Ok(Some(Box::new(MethodPrinter {
            output: &mut self.output,
            labels: LabelGenerator::new(),
        })))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        writeln(&mut self.output, 0, "}");
        Ok(())
    }
}

pub struct FieldPrinter<'a> {
    output: &'a mut String,
}

impl<'a> FieldVisitor for FieldPrinter<'a> {
    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        writeln(
            self.output,
            4,
            &format!("// attribute {} ({} bytes)", attribute.name, attribute.info.len()),
        );
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        annotations(self.output, 4, attribute);
        Ok(())
    }
}

/// Prints method bodies one instruction per line, with labels flush against the margin
pub struct MethodPrinter<'a> {
    output: &'a mut String,
    labels: LabelGenerator,
}

impl<'a> MethodPrinter<'a> {
    fn insn(&mut self, line: &str) {
        writeln(self.output, 6, line);
    }
}

impl<'a> MethodVisitor for MethodPrinter<'a> {
    fn new_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        writeln(
            self.output,
            4,
            &format!("// attribute {} ({} bytes)", attribute.name, attribute.info.len()),
        );
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        annotations(self.output, 4, attribute);
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        writeln(self.output, 4, "Code:");
        Ok(())
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.insn(mnemonic(opcode));
        Ok(())
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        let line = match array_type_name(operand) {
            Some(name) if opcode == NEWARRAY => format!("{} {}", mnemonic(opcode), name),
            _ => format!("{} {}", mnemonic(opcode), operand),
        };
        self.insn(&line);
        Ok(())
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        self.insn(&format!("{} {}", mnemonic(opcode), var));
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        self.insn(&format!("{} {}", mnemonic(opcode), class));
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        self.insn(&format!("{} {}.{} : {}", mnemonic(opcode), owner, name, descriptor));
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        let suffix = if is_interface { " (itf)" } else { "" };
        self.insn(&format!(
            "{} {}.{}{}{}",
            mnemonic(opcode),
            owner,
            name,
            descriptor,
            suffix
        ));
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        let arguments = bootstrap_arguments
            .iter()
            .map(|argument| argument.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.insn(&format!(
            "invokedynamic {}{} [{}] ({})",
            name, descriptor, bootstrap, arguments
        ));
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        self.insn(&format!("{} {}", mnemonic(opcode), target));
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        writeln(self.output, 4, &format!("{}:", label));
        Ok(())
    }

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) -> Result<(), Error> {
        self.insn(&format!("ldc {}", constant));
        Ok(())
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.insn(&format!("iinc {} {}", var, increment));
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.insn(&format!(
            "tableswitch {}..{} [{}] default {}",
            low,
            high,
            labels(targets),
            default
        ));
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        let cases = keys
            .iter()
            .zip(targets)
            .map(|(key, target)| format!("{}: {}", key, target))
            .collect::<Vec<_>>()
            .join(", ");
        self.insn(&format!("lookupswitch [{}] default {}", cases, default));
        Ok(())
    }

    fn visit_multi_anew_array_insn(&mut self, class: &str, dimensions: u8) -> Result<(), Error> {
        self.insn(&format!("multianewarray {} {}", class, dimensions));
        Ok(())
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        writeln(
            self.output,
            6,
            &format!(
                "// try {} {} catch {} -> {}",
                start,
                end,
                catch_type.unwrap_or("any"),
                handler
            ),
        );
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        let mut line = format!("// local {} {} {} {}..{}", index, name, descriptor, start, end);
        if let Some(signature) = signature {
            line.push_str(&format!(" signature {}", signature));
        }
        writeln(self.output, 6, &line);
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        writeln(self.output, 6, &format!("// line {} {}", line, start));
        Ok(())
    }

    fn visit_frame(&mut self, locals: &[FrameType], stack: &[FrameType]) -> Result<(), Error> {
        writeln(
            self.output,
            6,
            &format!(
                "// frame locals [{}] stack [{}]",
                frame_types(locals),
                frame_types(stack)
            ),
        );
        Ok(())
    }

    fn visit_code_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        writeln(
            self.output,
            6,
            &format!("// attribute {} ({} bytes)", attribute.name, attribute.info.len()),
        );
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        writeln(
            self.output,
            6,
            &format!("// max stack {} max locals {}", max_stack, max_locals),
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::opcodes::{GOTO, ILOAD, IRETURN};
    use crate::jvm::{ClassAccessFlags, MethodAccessFlags, Version};

    #[test]
    fn prints_method_body() {
        let mut printer = Printer::new();
        printer
            .visit_header(&ClassHeader {
                version: Version::JAVA8,
                access: ClassAccessFlags::PUBLIC,
                name: String::from("me/Foo"),
                super_name: Some(String::from("java/lang/Object")),
                interfaces: vec![],
                signature: None,
            })
            .unwrap();
        {
            let mut method = printer
                .visit_method(&MethodHeader {
                    access: MethodAccessFlags::STATIC,
                    name: String::from("id"),
                    descriptor: String::from("(I)I"),
                    signature: None,
                    exceptions: vec![],
                })
                .unwrap()
                .unwrap();
            let label = method.new_label();
            method.visit_code().unwrap();
            method.visit_label(label).unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_insn(IRETURN).unwrap();
            method.visit_jump_insn(GOTO, label).unwrap();
            method.visit_maxs(1, 1).unwrap();
            method.visit_end().unwrap();
        }
        printer.visit_end().unwrap();

        let output = printer.into_output();
        assert!(output.starts_with("// class version 52.0\n"));
        assert!(output.contains("class me/Foo extends java/lang/Object {\n"));
        assert!(output.contains("    L0:\n      iload 0\n      ireturn\n      goto L0\n"));
        assert!(output.ends_with("}\n"));
    }

    #[test]
    fn prints_annotations() {
        use crate::jvm::annotations::{Annotation, ElementValue};

        let mut printer = Printer::new();
        printer
            .visit_annotations(&AnnotationAttribute::Annotations {
                visible: true,
                annotations: vec![Annotation {
                    type_descriptor: String::from("Lme/Ann;"),
                    elements: vec![
                        (String::from("value"), ElementValue::Int(3)),
                        (
                            String::from("names"),
                            ElementValue::Array(vec![
                                ElementValue::String(String::from("a")),
                                ElementValue::Class(String::from("V")),
                            ]),
                        ),
                    ],
                }],
            })
            .unwrap();
        assert_eq!(
            printer.output(),
            "  // RuntimeVisibleAnnotations @Lme/Ann;(value=3, names={\"a\", V.class})\n"
        );
    }

    #[test]
    fn array_types_by_name() {
        assert_eq!(array_type_name(T_INT as i32), Some("int"));
        assert_eq!(array_type_name(3), None);
        assert_eq!(array_type_name(-1), None);
    }
}
