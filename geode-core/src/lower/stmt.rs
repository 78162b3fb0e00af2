//! Statements and structured control flow.
//!
//! Loops and conditionals become basic blocks joined by branches. Locals
//! live in stack slots, so no phi nodes are needed at merge points.

use crate::ast::{Node, NodeKind};
use crate::error::CoreError;
use crate::span::Span;

use super::CompileContext;

impl CompileContext {
    pub(super) fn lower_stmt(&mut self, node: &Node) -> Result<(), CoreError> {
        match &node.kind {
            NodeKind::Block(stmts) => self.lower_block(stmts),
            NodeKind::Return(value) => self.lower_return(value.as_deref(), node.span),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => self.lower_if(cond, then, otherwise.as_deref()),
            NodeKind::While { cond, body } => self.lower_while(cond, body),
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(init, cond, step, body),
            _ => self.lower_expr(node).map(drop),
        }
    }

    /// One child scope; statements after a terminator are skipped.
    pub(super) fn lower_block(&mut self, stmts: &[Node]) -> Result<(), CoreError> {
        let previous = self.enter_scope();
        let mut result = Ok(());
        for (i, stmt) in stmts.iter().enumerate() {
            if self.builder.has_terminator() {
                tracing::trace!(skipped = stmts.len() - i, "unreachable statements after terminator");
                break;
            }
            result = self.lower_stmt(stmt);
            if result.is_err() {
                break;
            }
        }
        self.exit_scope(previous);
        result
    }

    fn lower_return(&mut self, value: Option<&Node>, span: Span) -> Result<(), CoreError> {
        let frame = self.frame(span)?;
        let ret = frame.ret.clone();
        let name = frame.name.clone();
        match value {
            Some(value) => {
                let lowered = self.lower_value(value)?;
                if ret.is_void() {
                    return Err(CoreError::type_mismatch(
                        format!("`{name}` returns `void` but a value was returned"),
                        value.span,
                    ));
                }
                let converted = self.convert_to(lowered, &ret, value.span)?;
                self.builder.ret(Some(converted));
            }
            None if ret.is_void() => self.builder.ret(None),
            None => {
                return Err(CoreError::type_mismatch(
                    format!("`{name}` must return a `{ret}` value"),
                    span,
                ));
            }
        }
        Ok(())
    }

    fn lower_if(&mut self, cond: &Node, then: &Node, otherwise: Option<&Node>) -> Result<(), CoreError> {
        let condition = self.lower_value(cond)?;
        let condition = self.coerce_condition(condition, cond.span)?;

        let label = self.next_label();
        let func = self.builder.position().func;
        let then_block = self.builder.append_block(func, format!("if.then.{label}"));
        let else_block = self.builder.append_block(func, format!("if.else.{label}"));
        let merge_block = self.builder.append_block(func, format!("if.merge.{label}"));
        tracing::trace!(label, "lowering if");
        self.builder.cond_br(condition, then_block, else_block);

        self.builder.position_at_end(func, then_block);
        self.lower_stmt(then)?;
        self.builder.br(merge_block);

        self.builder.position_at_end(func, else_block);
        if let Some(otherwise) = otherwise {
            self.lower_stmt(otherwise)?;
        }
        self.builder.br(merge_block);

        self.builder.position_at_end(func, merge_block);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Node, body: &Node) -> Result<(), CoreError> {
        let label = self.next_label();
        let func = self.builder.position().func;
        let cond_block = self.builder.append_block(func, format!("while.cond.{label}"));
        let body_block = self.builder.append_block(func, format!("while.body.{label}"));
        let merge_block = self.builder.append_block(func, format!("while.merge.{label}"));
        tracing::trace!(label, "lowering while");
        self.builder.br(cond_block);

        self.builder.position_at_end(func, cond_block);
        let condition = self.lower_value(cond)?;
        let condition = self.coerce_condition(condition, cond.span)?;
        self.builder.cond_br(condition, body_block, merge_block);

        self.builder.position_at_end(func, body_block);
        self.lower_stmt(body)?;
        self.builder.br(cond_block);

        self.builder.position_at_end(func, merge_block);
        Ok(())
    }

    /// The loop variable lives in a scope around the whole loop.
    fn lower_for(&mut self, init: &Node, cond: &Node, step: &Node, body: &Node) -> Result<(), CoreError> {
        let previous = self.enter_scope();
        let result = self.lower_for_in_scope(init, cond, step, body);
        self.exit_scope(previous);
        result
    }

    fn lower_for_in_scope(&mut self, init: &Node, cond: &Node, step: &Node, body: &Node) -> Result<(), CoreError> {
        self.lower_expr(init)?;

        let label = self.next_label();
        let func = self.builder.position().func;
        let cond_block = self.builder.append_block(func, format!("for.cond.{label}"));
        let body_block = self.builder.append_block(func, format!("for.body.{label}"));
        let step_block = self.builder.append_block(func, format!("for.step.{label}"));
        let merge_block = self.builder.append_block(func, format!("for.merge.{label}"));
        tracing::trace!(label, "lowering for");
        self.builder.br(cond_block);

        self.builder.position_at_end(func, cond_block);
        let condition = self.lower_value(cond)?;
        let condition = self.coerce_condition(condition, cond.span)?;
        self.builder.cond_br(condition, body_block, merge_block);

        self.builder.position_at_end(func, body_block);
        self.lower_stmt(body)?;
        self.builder.br(step_block);

        self.builder.position_at_end(func, step_block);
        self.lower_expr(step)?;
        self.builder.br(cond_block);

        self.builder.position_at_end(func, merge_block);
        Ok(())
    }
}
