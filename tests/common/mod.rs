#![allow(dead_code)]

use classweaver::jvm::annotations::AnnotationAttribute;
use classweaver::jvm::visitor::{
    ClassHeader, FieldHeader, FrameType, InnerClassEntry, MethodHeader, RawAttribute,
};
use classweaver::jvm::{
    ClassAccessFlags, ClassReader, ClassVisitor, ClassWriter, ConstantValue, Error, FieldVisitor,
    Handle, Label, LabelGenerator, MethodAccessFlags, MethodVisitor, ReaderFlags, Version,
    WriterSettings,
};

/// Class visitor that writes down every call it gets, one line per call
///
/// Labels are handed out in request order, so two reads of classes with the same logical content
/// produce the same events.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<String>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder { events: vec![] }
    }

    /// Events between the start of a method and its end (both excluded)
    pub fn method_events(&self, name: &str) -> Vec<String> {
        let start = format!("method {}", name);
        self.events
            .iter()
            .skip_while(|event| !event.starts_with(&start))
            .skip(1)
            .take_while(|event| event.as_str() != "end method")
            .cloned()
            .collect()
    }
}

impl ClassVisitor for Recorder {
    fn visit_header(&mut self, header: &ClassHeader) -> Result<(), Error> {
        self.events.push(format!("header {:?}", header));
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        self.events.push(format!("source {}", source_file));
        Ok(())
    }

    fn visit_outer_class(
        &mut self,
        owner: &str,
        method: Option<(&str, &str)>,
    ) -> Result<(), Error> {
        self.events.push(format!("outer {} {:?}", owner, method));
        Ok(())
    }

    fn visit_nest_host(&mut self, host: &str) -> Result<(), Error> {
        self.events.push(format!("nest host {}", host));
        Ok(())
    }

    fn visit_nest_member(&mut self, member: &str) -> Result<(), Error> {
        self.events.push(format!("nest member {}", member));
        Ok(())
    }

    fn visit_inner_class(&mut self, inner_class: &InnerClassEntry) -> Result<(), Error> {
        self.events.push(format!("inner {:?}", inner_class));
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        self.events.push(format!("attribute {:?}", attribute));
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        self.events.push(format!("annotations {:?}", attribute));
        Ok(())
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        self.events.push(format!("field {:?}", header));
        Ok(Some(Box::new(FieldRecorder {
            events: &mut self.events,
        })))
    }

    fn visit_method(
        &mut self,
        header: &MethodHeader,
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        self.events
            .push(format!("method {}{} {:?}", header.name, header.descriptor, header));
        Ok(Some(Box::new(MethodRecorder {
            events: &mut self.events,
            labels: LabelGenerator::new(),
        })))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("end class"));
        Ok(())
    }
}

struct FieldRecorder<'a> {
    events: &'a mut Vec<String>,
}

impl<'a> FieldVisitor for FieldRecorder<'a> {
    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        self.events.push(format!("attribute {:?}", attribute));
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        self.events.push(format!("annotations {:?}", attribute));
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("end field"));
        Ok(())
    }
}

struct MethodRecorder<'a> {
    events: &'a mut Vec<String>,
    labels: LabelGenerator,
}

impl<'a> MethodVisitor for MethodRecorder<'a> {
    fn new_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        self.events.push(format!("attribute {:?}", attribute));
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        self.events.push(format!("annotations {:?}", attribute));
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.events.push(String::from("code"));
        Ok(())
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.events.push(format!("insn {}", opcode));
        Ok(())
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        self.events.push(format!("int {} {}", opcode, operand));
        Ok(())
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        self.events.push(format!("var {} {}", opcode, var));
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        self.events.push(format!("type {} {}", opcode, class));
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        self.events
            .push(format!("member {} {}.{}:{}", opcode, owner, name, descriptor));
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
        self.events.push(format!(
            "invoke {} {}.{}{} {}",
            opcode, owner, name, descriptor, is_interface
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
        self.events.push(format!(
            "indy {}{} {:?} {:?}",
            name, descriptor, bootstrap, bootstrap_arguments
        ));
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        self.events.push(format!("jump {} {}", opcode, target));
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.events.push(format!("label {}", label));
        Ok(())
    }

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) -> Result<(), Error> {
        self.events.push(format!("ldc {:?}", constant));
        Ok(())
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.events.push(format!("iinc {} {}", var, increment));
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.events.push(format!(
            "tableswitch {} {} {} {:?}",
            low, high, default, targets
        ));
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        self.events
            .push(format!("lookupswitch {} {:?} {:?}", default, keys, targets));
        Ok(())
    }

    fn visit_multi_anew_array_insn(&mut self, class: &str, dimensions: u8) -> Result<(), Error> {
        self.events
            .push(format!("multianewarray {} {}", class, dimensions));
        Ok(())
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        self.events.push(format!(
            "try {} {} {} {:?}",
            start, end, handler, catch_type
        ));
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
        self.events.push(format!(
            "local {} {} {:?} {} {} {}",
            name, descriptor, signature, start, end, index
        ));
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.events.push(format!("line {} {}", line, start));
        Ok(())
    }

    fn visit_frame(&mut self, locals: &[FrameType], stack: &[FrameType]) -> Result<(), Error> {
        self.events.push(format!("frame {:?} {:?}", locals, stack));
        Ok(())
    }

    fn visit_code_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        self.events.push(format!("code attribute {:?}", attribute));
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.events.push(format!("maxs {} {}", max_stack, max_locals));
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("end method"));
        Ok(())
    }
}

/// Read a class and record everything it contains
pub fn record(bytes: &[u8]) -> Result<Recorder, Error> {
    let reader = ClassReader::new(bytes)?;
    let mut recorder = Recorder::new();
    reader.accept(&mut recorder, ReaderFlags::empty())?;
    Ok(recorder)
}

/// Read a class and write it back out without changes
pub fn rewrite(bytes: &[u8], settings: WriterSettings) -> Result<Vec<u8>, Error> {
    let reader = ClassReader::new(bytes)?;
    let mut writer = ClassWriter::new(settings);
    reader.accept(&mut writer, ReaderFlags::empty())?;
    writer.to_bytes()
}

pub fn class_header(name: &str) -> ClassHeader {
    ClassHeader {
        version: Version::JAVA8,
        access: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name: String::from(name),
        super_name: Some(String::from("java/lang/Object")),
        interfaces: vec![],
        signature: None,
    }
}

pub fn static_method(name: &str, descriptor: &str) -> MethodHeader {
    MethodHeader {
        access: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name: String::from(name),
        descriptor: String::from(descriptor),
        signature: None,
        exceptions: vec![],
    }
}

/// Write a class `me/Test` with one static method whose body is produced by `body`
pub fn single_method_class(
    settings: WriterSettings,
    descriptor: &str,
    body: impl FnOnce(&mut dyn MethodVisitor) -> Result<(), Error>,
) -> Result<Vec<u8>, Error> {
    let mut writer = ClassWriter::new(settings);
    writer.visit_header(&class_header("me/Test"))?;
    if let Some(mut method) = writer.visit_method(&static_method("run", descriptor))? {
        method.visit_code()?;
        body(method.as_mut())?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    writer.to_bytes()
}
