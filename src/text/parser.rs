//! Parser for textual PCO IR.

use hashbrown::HashMap;

use crate::core::ParseError;
use crate::ir::{
    BlockId, Bits, Builder, ExecCnd, FuncKind, Function, InstrId, Instr, InstrMods, Op, PhiSrc,
    Ref, RefKind, RegClass, Shader, Stage,
};

/// Parse a whole shader.
pub fn parse_shader(text: &str) -> std::result::Result<Shader, ParseError> {
    Parser::new(text).parse()
}

type Result<T> = std::result::Result<T, ParseError>;

struct Parser<'a> {
    text: &'a str,
    pos: usize,

    // Per-function state
    blocks: HashMap<&'a str, BlockId>,
    block_resolves: Vec<Resolve<'a>>,
    max_ssa: Option<u32>,
}

/// Block label referenced before it may have been defined.
#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    pos: usize,
    instr: InstrId,
    /// Index into `phi_srcs`, or `None` for the branch target.
    phi: Option<usize>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            blocks: HashMap::new(),
            block_resolves: Vec::new(),
            max_ssa: None,
        }
    }

    fn parse(mut self) -> Result<Shader> {
        let keyword = self.read_identifier()?;
        if keyword != "shader" {
            return Err(self.error(format!("expected 'shader' but found '{}'", keyword)));
        }
        let stage_name = self.read_identifier()?;
        let stage = Stage::from_name(stage_name)
            .ok_or_else(|| self.error(format!("unknown shader stage '{}'", stage_name)))?;
        let mut shader = Shader::new("shader", stage);

        self.skip_whitespace(true);
        while !self.is_eof() {
            let func = self.parse_function()?;
            log::trace!("parsed function {} ({} instrs)", func.name, func.num_instrs());
            shader.add_function(func);
            self.skip_whitespace(true);
        }

        Ok(shader)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> ParseError {
        let consumed = &self.text[..pos.min(self.text.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.rfind('\n').map_or(consumed.len(), |nl| consumed.len() - nl - 1) + 1;
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.text[self.pos..].starts_with(s)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to the end of the line; the newline itself is
                // left for callers that care about line ends.
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn is_at_line_end(&mut self) -> bool {
        self.skip_whitespace(false);
        matches!(self.current_char(), None | Some('\n') | Some('}'))
    }

    fn read_identifier(&mut self) -> Result<&'a str> {
        self.skip_whitespace(true);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{}'", ch))),
            None => return Err(self.error("expected identifier but found end of input")),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    /// Letters only, for register-class prefixes such as `vi` in `vi5`.
    fn read_letters(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphabetic() {
                self.advance();
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    fn read_number(&mut self) -> Result<u32> {
        let start = self.pos;

        if self.peek_str("0x") || self.peek_str("0X") {
            self.pos += 2;
            let digits = self.pos;
            while self.current_char().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                self.advance();
            }
            if self.pos == digits {
                return Err(self.error_at(start, "expected hex digits after '0x'"));
            }
            return u32::from_str_radix(&self.text[digits..self.pos], 16)
                .map_err(|e| self.error_at(start, format!("failed to parse hex number: {}", e)));
        }

        while self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(self.error("expected number"));
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|e| self.error_at(start, format!("failed to parse number: {}", e)))
    }

    /// Whether the next token is a block label (`name:`).
    fn peek_label(&mut self) -> bool {
        let saved = self.pos;
        let is_label = self.read_identifier().is_ok() && self.current_char() == Some(':');
        self.pos = saved;
        is_label
    }

    fn parse_function(&mut self) -> Result<Function> {
        let keyword = self.read_identifier()?;
        let kind = match keyword {
            "entry" => FuncKind::Entrypoint,
            "func" => FuncKind::Callable,
            _ => {
                return Err(self.error(format!(
                    "expected 'entry' or 'func' but found '{}'",
                    keyword
                )))
            }
        };
        let name = self.read_identifier()?;
        self.expect('{')?;

        let mut func = Function::new(name, kind);
        self.blocks.clear();
        self.block_resolves.clear();
        self.max_ssa = None;

        let mut current: Option<BlockId> = None;
        loop {
            self.skip_whitespace(true);
            match self.current_char() {
                None => return Err(self.error(format!("unterminated function {}", name))),
                Some('}') => {
                    self.advance();
                    break;
                }
                _ => {}
            }

            if self.peek_label() {
                let label_pos = self.pos;
                let label = self.read_identifier()?;
                self.expect(':')?;
                if self.blocks.contains_key(label) {
                    return Err(self.error_at(label_pos, format!("duplicate block label {}", label)));
                }
                let block = func.add_block(label);
                self.blocks.insert(label, block);
                current = Some(block);
                continue;
            }

            let Some(block) = current else {
                return Err(self.error("instruction outside of a block"));
            };
            self.parse_instruction(&mut func, block)?;
        }

        self.resolve_blocks(&mut func)?;
        func.next_ssa = self.max_ssa.map_or(0, |max| max + 1);
        Ok(func)
    }

    fn parse_instruction(&mut self, func: &mut Function, block: BlockId) -> Result<()> {
        let start = self.pos;

        // Destinations are only present when a ref list is followed by '='.
        let dests = match self.parse_ref_list() {
            Ok(refs) if self.try_read('=') => refs,
            _ => {
                self.pos = start;
                Vec::new()
            }
        };

        let (op, mods) = self.parse_opcode()?;
        let mut instr = Instr::new(op, dests, Vec::new()).with_mods(mods);
        let mut labels: Vec<(&'a str, usize, Option<usize>)> = Vec::new();

        if !self.is_at_line_end() && !self.peek_str("->") {
            loop {
                let value = self.parse_ref()?;
                self.skip_whitespace(false);
                if self.peek_str("<-") {
                    self.pos += 2;
                    self.skip_whitespace(false);
                    let label_pos = self.pos;
                    let label = self.read_identifier()?;
                    labels.push((label, label_pos, Some(instr.phi_srcs.len())));
                    instr.phi_srcs.push(PhiSrc {
                        pred: BlockId(0),
                        value,
                    });
                } else {
                    instr.srcs.push(value);
                }
                if !self.try_read(',') {
                    break;
                }
            }
        }

        self.skip_whitespace(false);
        if self.peek_str("->") {
            self.pos += 2;
            self.skip_whitespace(false);
            let label_pos = self.pos;
            let label = self.read_identifier()?;
            labels.push((label, label_pos, None));
        }

        if !self.is_at_line_end() {
            return Err(self.error(format!("unexpected {:?} after instruction", self.current_char())));
        }
        self.check_operands(&instr, start)?;

        let id = Builder::at_end(func, block).insert(instr);
        for (name, pos, phi) in labels {
            self.block_resolves.push(Resolve {
                name,
                pos,
                instr: id,
                phi,
            });
        }
        Ok(())
    }

    /// Opcode with its dot-separated modifiers, e.g. `uvsw.write.rpt2`.
    fn parse_opcode(&mut self) -> Result<(Op, InstrMods)> {
        self.skip_whitespace(false);
        let start = self.pos;
        while self
            .current_char()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
        {
            self.advance();
        }
        let token = &self.text[start..self.pos];
        if token.is_empty() {
            return Err(self.error(format!("expected opcode but found {:?}", self.current_char())));
        }

        // Op names may themselves contain dots; take the longest match.
        let parts: Vec<&str> = token.split('.').collect();
        let (op, consumed) = (1..=parts.len())
            .rev()
            .find_map(|n| Op::from_name(&parts[..n].join(".")).map(|op| (op, n)))
            .ok_or_else(|| self.error_at(start, format!("unknown opcode '{}'", token)))?;

        let mut mods = InstrMods::default();
        for part in &parts[consumed..] {
            if let Some(count) = part.strip_prefix("rpt").and_then(|n| n.parse::<u8>().ok()) {
                if count == 0 || count > 16 {
                    return Err(self.error_at(start, format!("repeat count {} out of range", count)));
                }
                mods.rpt = count;
            } else if let Some(cnd) = ExecCnd::from_name(part) {
                mods.exec_cnd = cnd;
            } else {
                match *part {
                    "end" => mods.end = true,
                    "olchk" => mods.olchk = true,
                    "atom" => mods.atom = true,
                    _ => {
                        return Err(self.error_at(
                            start,
                            format!("unknown modifier '{}' on {}", part, op.name()),
                        ))
                    }
                }
            }
        }

        Ok((op, mods))
    }

    fn parse_ref_list(&mut self) -> Result<Vec<Ref>> {
        let mut refs = vec![self.parse_ref()?];
        while self.try_read(',') {
            refs.push(self.parse_ref()?);
        }
        Ok(refs)
    }

    fn parse_ref(&mut self) -> Result<Ref> {
        self.skip_whitespace(false);
        let start = self.pos;

        let mut r = match self.current_char() {
            Some('%') => {
                self.advance();
                let index = self.read_number()?;
                self.max_ssa = Some(self.max_ssa.map_or(index, |max| max.max(index)));
                Ref::ssa32(index)
            }
            Some('_') => {
                self.advance();
                Ref::NULL
            }
            Some(ch) if ch.is_ascii_digit() => Ref::imm32(self.read_number()?),
            Some(ch) if ch.is_ascii_alphabetic() => {
                let prefix = self.read_letters();
                let index = self.read_number()?;
                match prefix {
                    "io" => Ref::io(index),
                    "p" => Ref::pred(index),
                    "drc" => Ref::drc(index),
                    _ => {
                        let class = RegClass::ALL
                            .iter()
                            .copied()
                            .find(|c| c.prefix() == prefix)
                            .ok_or_else(|| {
                                self.error_at(start, format!("unknown register class '{}'", prefix))
                            })?;
                        Ref::hwreg(class, index)
                    }
                }
            }
            other => return Err(self.error(format!("expected operand but found {:?}", other))),
        };

        if self.current_char() == Some(':') {
            self.advance();
            let chans = self.read_number()?;
            if chans == 0 || chans > 4 {
                return Err(self.error_at(start, format!("{} channels out of range", chans)));
            }
            r.chans = chans as u8;
        }
        if self.current_char() == Some('@') {
            self.advance();
            let bits = self.read_number()?;
            r.bits = Bits::from_bits(bits)
                .ok_or_else(|| self.error_at(start, format!("unsupported bit width {}", bits)))?;
        }

        while self.current_char() == Some('.') {
            self.advance();
            let name = self.read_identifier()?;
            match name {
                "neg" => r.mods.neg = true,
                "abs" => r.mods.abs = true,
                "flr" => r.mods.flr = true,
                "oneminus" => r.mods.oneminus = true,
                "clamp" => r.mods.clamp = true,
                _ => {
                    let elem = name.strip_prefix('e').and_then(|n| n.parse::<u8>().ok());
                    match elem {
                        Some(elem) if elem < 4 => r.elem = elem,
                        _ => {
                            return Err(self.error_at(
                                start,
                                format!("unknown operand modifier '{}'", name),
                            ))
                        }
                    }
                }
            }
        }

        if matches!(r.kind, RefKind::Imm(_)) && r.has_mods() {
            return Err(self.error_at(start, "immediates cannot carry modifiers"));
        }
        Ok(r)
    }

    fn check_operands(&self, instr: &Instr, pos: usize) -> Result<()> {
        let info = instr.info();
        if instr.dests.len() != info.num_dests as usize {
            return Err(self.error_at(
                pos,
                format!(
                    "{} takes {} destination(s), found {}",
                    info.name,
                    info.num_dests,
                    instr.dests.len()
                ),
            ));
        }
        if !info.is_variadic() && instr.srcs.len() != info.num_srcs as usize {
            return Err(self.error_at(
                pos,
                format!(
                    "{} takes {} source(s), found {}",
                    info.name,
                    info.num_srcs,
                    instr.srcs.len()
                ),
            ));
        }
        if instr.op != Op::Phi && !instr.phi_srcs.is_empty() {
            return Err(self.error_at(pos, format!("{} cannot take incoming blocks", info.name)));
        }
        let extra = instr.mods.set_mask();
        if !instr.supports_mods(extra) {
            return Err(self.error_at(pos, format!("unsupported modifier on {}", info.name)));
        }
        Ok(())
    }

    fn resolve_blocks(&mut self, func: &mut Function) -> Result<()> {
        for resolve in std::mem::take(&mut self.block_resolves) {
            let block = *self.blocks.get(resolve.name).ok_or_else(|| {
                self.error_at(resolve.pos, format!("unknown block {}", resolve.name))
            })?;
            let instr = func.instr_mut(resolve.instr);
            match resolve.phi {
                Some(i) => instr.phi_srcs[i].pred = block,
                None => instr.target = Some(block),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RefMods;

    fn entry_lines(shader: &Shader) -> Vec<String> {
        let func = shader.entrypoint().unwrap();
        func.instr_ids().into_iter().map(|id| func.instr(id).to_string()).collect()
    }

    #[test]
    fn test_parse_simple_shader() {
        let shader = parse_shader(
            "; passthrough
             shader vertex
             entry main {
             b0:
                 %0 = fadd vi0, vi1   ; sum
                 uvsw.write %0, io0
             }",
        )
        .unwrap();

        assert_eq!(shader.stage, Stage::Vertex);
        assert_eq!(shader.functions.len(), 1);
        let func = shader.entrypoint().unwrap();
        assert_eq!(func.name, "main");
        assert_eq!(func.next_ssa, 1);
        assert_eq!(entry_lines(&shader), vec!["%0 = fadd vi0, vi1", "uvsw.write %0, io0"]);
    }

    #[test]
    fn test_parse_operands_and_modifiers() {
        let shader = parse_shader(
            "shader fragment
             entry main {
             b0:
                 %3:2@16 = ld drc1, sh0
                 %7 = fadd.rpt2.olchk %3.e1.flr.neg, sc32.abs
                 %8 = movi32.e1_z0 0x3f800000
             }",
        )
        .unwrap();
        let func = shader.entrypoint().unwrap();
        assert_eq!(func.next_ssa, 9);

        let ids = func.instr_ids();
        let ld = func.instr(ids[0]);
        assert_eq!(ld.dests[0], Ref::ssa(3, Bits::B16, 2));
        assert_eq!(ld.srcs[0], Ref::drc(1));

        let fadd = func.instr(ids[1]);
        assert_eq!(fadd.mods.rpt, 2);
        assert!(fadd.mods.olchk);
        assert_eq!(fadd.srcs[0].elem, 1);
        assert_eq!(
            fadd.srcs[0].mods,
            RefMods {
                neg: true,
                flr: true,
                ..RefMods::NONE
            }
        );
        assert_eq!(fadd.srcs[1], Ref::hwreg(RegClass::Const, 32).abs());

        let movi = func.instr(ids[2]);
        assert_eq!(movi.mods.exec_cnd, ExecCnd::E1Z0);
        assert_eq!(movi.srcs[0].as_imm(), Some(0x3f80_0000));
    }

    #[test]
    fn test_parse_blocks_phis_and_branches() {
        let shader = parse_shader(
            "shader compute
             func helper {
             b0:
             }
             entry main {
             b0:
                 %0 = mov r0
                 br -> b1
             b1:
                 %1 = phi %0 <- b0, r1 <- b1
             }",
        )
        .unwrap();

        assert_eq!(shader.functions.len(), 2);
        assert_eq!(shader.functions[0].kind, FuncKind::Callable);
        assert_eq!(shader.functions[0].num_blocks(), 1);
        assert_eq!(
            entry_lines(&shader),
            vec!["%0 = mov r0", "br -> b1", "%1 = phi %0 <- b0, r1 <- b1"]
        );
    }

    #[test]
    fn test_printed_shader_parses_back() {
        let src = "shader vertex
             entry main {
             b0:
                 %0 = fadd r0.abs, cf1
                 uvsw.write.rpt2 r4:2, io3
                 nop.end
             }";
        let shader = parse_shader(src).unwrap();
        let reparsed = parse_shader(&shader.to_string()).unwrap();
        assert_eq!(entry_lines(&reparsed), entry_lines(&shader));
    }

    #[test]
    fn test_parse_errors_report_position() {
        let err = parse_shader("shader vertex\nentry main {\nb0:\n    %0 = frob r0\n}").unwrap_err();
        assert_eq!(err.line, 4);
        assert_eq!(err.column, 10);
        assert!(err.message.contains("unknown opcode 'frob'"));

        let err = parse_shader("shader vertex\nentry main {\n    nop\n}").unwrap_err();
        assert!(err.message.contains("outside of a block"));

        let err = parse_shader("shader vertex\nentry main {\nb0:\n    %0 = fadd r0\n}").unwrap_err();
        assert!(err.message.contains("fadd takes 2 source(s), found 1"));

        let err = parse_shader("shader vertex\nentry main {\nb0:\n    br -> b9\n}").unwrap_err();
        assert!(err.message.contains("unknown block b9"));

        let err = parse_shader("shader geometry").unwrap_err();
        assert!(err.message.contains("unknown shader stage"));
    }
}
