//! C rendering of lowered functions.
//!
//! Registers are always addressed as `base + N` and re-read after every
//! safepoint, so no pointer into the stack outlives a statement that can
//! move it.

use seltran_bytecode::opcode::FIELDS_PER_FLUSH;
use seltran_bytecode::{disasm, Proto};
use seltran_lower::ir::CompareOp;
use seltran_lower::{ArithOp, Block, Cond, Exit, LoweredFunction, Operand, Place, Reg, Stmt, Tier};

use crate::writer::CodeWriter;

pub fn label(pc: usize) -> String {
    format!("label_{pc}")
}

fn reg(r: Reg) -> String {
    format!("base + {r}")
}

fn operand(o: Operand) -> String {
    match o {
        Operand::Reg(r) => reg(r),
        Operand::Const(k) => format!("k + {k}"),
    }
}

fn place(p: Place) -> String {
    match p {
        Place::Reg(r) => reg(r),
        Place::Upval(u) => format!("cl->upvals[{u}]->v"),
    }
}

/// `None` means "up to the stack top" / "all results".
fn count_or(count: Option<u16>, open: &str) -> String {
    match count {
        Some(n) => n.to_string(),
        None => open.to_string(),
    }
}

/// Write the generated function for one prototype.
pub fn write_function(
    w: &mut CodeWriter,
    symbol: &str,
    proto: &Proto,
    lowered: &LoweredFunction,
    comments: bool,
) {
    if comments {
        w.comment(&format!("source = {}", proto.source_name()));
        w.comment(&format!("linedefined = {}", proto.linedefined));
        w.comment(&format!("lastlinedefined = {}", proto.lastlinedefined));
        w.comment(&format!("what = {}", proto.kind().name()));
    }
    w.line(format!("static int {symbol} (lua_State *L)"));
    w.braced("", |w| {
        w.line("CallInfo *ci = L->ci;");
        w.line("LClosure *cl = clLvalue(ci->func);");
        w.line("TValue *k = cl->p->k;");
        w.line("StkId base = ci->u.l.base;");
        w.blank();
        w.line("(void) cl;");
        w.line("(void) k;");
        w.line("(void) base;");
        w.blank();
        for block in &lowered.blocks {
            if comments && !block.is_end() {
                w.comment(&disasm::describe(proto, block.pc));
            }
            write_block(w, block);
            w.blank();
        }
    });
    w.blank();
}

fn write_block(w: &mut CodeWriter, block: &Block) {
    w.braced(format!("{}:", label(block.pc)), |w| {
        for stmt in &block.stmts {
            write_stmt(w, stmt);
        }
        write_exit(w, block);
    });
}

fn write_jump(w: &mut CodeWriter, block: &Block, target: usize) {
    let delta = block.pc_delta(target);
    if delta != 0 {
        w.line(format!("ci->u.l.savedpc += {delta};"));
    }
    w.line(format!("goto {};", label(target)));
}

fn write_exit(w: &mut CodeWriter, block: &Block) {
    match &block.exit {
        Exit::Next | Exit::Return => {}
        Exit::Goto { target } => write_jump(w, block, *target),
        Exit::Branch {
            cond,
            target,
            on_taken,
            otherwise,
        } => {
            w.braced(format!("if ({})", condition(*cond)), |w| {
                for stmt in on_taken {
                    write_stmt(w, stmt);
                }
                write_jump(w, block, *target);
            });
            if !otherwise.is_empty() {
                w.braced("else", |w| {
                    for stmt in otherwise {
                        write_stmt(w, stmt);
                    }
                });
            }
        }
    }
}

fn condition(cond: Cond) -> String {
    match cond {
        Cond::CompareDiffers { expected } => format!("cmp != {}", u8::from(expected)),
        Cond::Falsy(r) => format!("l_isfalse({})", reg(r)),
        Cond::Truthy(r) => format!("!l_isfalse({})", reg(r)),
        Cond::LoopContinues => "jump".to_string(),
        Cond::NotNil(r) => format!("!ttisnil({})", reg(r)),
    }
}

fn write_stmt(w: &mut CodeWriter, stmt: &Stmt) {
    match *stmt {
        Stmt::Fetch => w.line("ci->u.l.savedpc++;"),
        Stmt::ConsumeExtraArg => w.line("ci->u.l.savedpc++;  /* extra argument */"),
        Stmt::HookCheck => {
            w.line("if (L->hookmask & (LUA_MASKLINE | LUA_MASKCOUNT))");
            w.line("  luaG_traceexec(L);");
        }
        Stmt::RefreshBase => w.line("base = ci->u.l.base;"),
        Stmt::RestoreTop => w.line("L->top = ci->top;"),

        Stmt::Move { dst, src } => w.line(format!("setobjs2s(L, {}, {});", reg(dst), reg(src))),
        Stmt::LoadConst { dst, index } => w.line(format!("setobj2s(L, {}, k + {index});", reg(dst))),
        Stmt::LoadBool { dst, value } => {
            w.line(format!("setbvalue({}, {});", reg(dst), u8::from(value)))
        }
        Stmt::LoadNil { dst, extra: 0 } => w.line(format!("setnilvalue({});", reg(dst))),
        Stmt::LoadNil { dst, extra } => w.braced("", |w| {
            w.line("int n;");
            w.line(format!("for (n = 0; n <= {extra}; n++)"));
            w.line(format!("  setnilvalue({} + n);", reg(dst)));
        }),
        Stmt::GetUpval { dst, upval } => {
            w.line(format!("setobj2s(L, {}, cl->upvals[{upval}]->v);", reg(dst)))
        }
        Stmt::SetUpval { src, upval } => w.braced("", |w| {
            w.line(format!("UpVal *uv = cl->upvals[{upval}];"));
            w.line(format!("setobj(L, uv->v, {});", reg(src)));
            w.line("luaC_upvalbarrier(L, uv);");
        }),
        Stmt::GetTable { dst, table, key } => w.line(format!(
            "SELTRAN_GETTABLE(L, {}, {}, {});",
            place(table),
            operand(key),
            reg(dst)
        )),
        Stmt::SetTable { table, key, value } => w.line(format!(
            "SELTRAN_SETTABLE(L, {}, {}, {});",
            place(table),
            operand(key),
            operand(value)
        )),
        Stmt::NewTable { dst, array, hash } => w.braced("", |w| {
            w.line("Table *t = luaH_new(L);");
            w.line(format!("sethvalue(L, {}, t);", reg(dst)));
            if array != 0 || hash != 0 {
                w.line(format!("luaH_resize(L, t, {array}u, {hash}u);"));
            }
        }),
        Stmt::SelfLookup { dst, object, key } => w.braced("", |w| {
            w.line("const TValue *aux;");
            w.line(format!("TValue *rb = {};", reg(object)));
            w.line(format!("TValue *rc = {};", operand(key)));
            w.line("TString *key = tsvalue(rc);");
            w.line(format!("setobjs2s(L, {} + 1, rb);", reg(dst)));
            w.line("if (luaV_fastget(L, rb, key, aux, luaH_getstr))");
            w.line(format!("  setobj2s(L, {}, aux);", reg(dst)));
            w.line("else");
            w.line(format!("  luaV_finishget(L, rb, rc, {}, aux);", reg(dst)));
        }),
        Stmt::Arith { op, dst, lhs, rhs } => write_arith(w, op, dst, &operand(lhs), Some(&operand(rhs))),
        Stmt::Unary { op, dst, src } => write_arith(w, op, dst, &reg(src), None),
        Stmt::Not { dst, src } => w.braced("", |w| {
            w.line(format!("int res = l_isfalse({});", reg(src)));
            w.line(format!("setbvalue({}, res);", reg(dst)));
        }),
        Stmt::Len { dst, src } => w.line(format!("luaV_objlen(L, {}, {});", reg(dst), reg(src))),
        Stmt::Concat { first, last } => {
            let total = i64::from(last) - i64::from(first) + 1;
            w.line(format!("L->top = {} + 1;", reg(last)));
            w.line(format!("luaV_concat(L, {total});"));
        }
        Stmt::CloseUpvals { from } => w.line(format!("luaF_close(L, {});", reg(from))),
        Stmt::Call {
            func,
            args,
            results,
        } => w.braced("", |w| {
            w.line(format!("StkId ra = {};", reg(func)));
            if let Some(n) = args {
                w.line(format!("L->top = ra + {};", u32::from(n) + 1));
            }
            w.line(format!(
                "if (!luaD_precall(L, ra, {}))",
                count_or(results, "LUA_MULTRET")
            ));
            w.line("  luaV_execute(L);");
            if results.is_some() {
                w.line("L->top = ci->top;");
            }
        }),
        Stmt::Return {
            first,
            count,
            close_upvalues,
        } => w.braced("", |w| {
            if close_upvalues {
                w.line("luaF_close(L, base);");
            }
            w.line(format!("StkId ra = {};", reg(first)));
            w.line(format!(
                "int ret = {};",
                count_or(count, "cast_int(L->top - ra)")
            ));
            w.line("luaD_poscall(L, ci, ra, ret);");
            w.line("return ret;");
        }),
        Stmt::ForPrep { base } => write_forprep(w, base),
        Stmt::ForStep { base } => write_forstep(w, base),
        Stmt::IterCall { base, results } => w.braced("", |w| {
            w.line(format!("StkId cb = {} + 3;", reg(base)));
            w.line(format!("setobjs2s(L, cb + 2, {} + 2);", reg(base)));
            w.line(format!("setobjs2s(L, cb + 1, {} + 1);", reg(base)));
            w.line(format!("setobjs2s(L, cb, {});", reg(base)));
            w.line("L->top = cb + 3;");
            w.line(format!("luaD_call(L, cb, {results});"));
        }),
        Stmt::SetList {
            table,
            count,
            batch,
        } => w.braced("", |w| {
            // Batches are numbered from 1.
            let offset = u64::from(batch.saturating_sub(1)) * u64::from(FIELDS_PER_FLUSH);
            w.line(format!("TValue *ra = {};", reg(table)));
            w.line(format!(
                "int n = {};",
                count_or(count, "cast_int(L->top - ra) - 1")
            ));
            w.line(format!("unsigned int last = {offset}u + n;"));
            w.line("Table *h = hvalue(ra);");
            w.line("if (last > h->sizearray)");
            w.line("  luaH_resizearray(L, h, last);");
            w.braced("for (; n > 0; n--)", |w| {
                w.line("TValue *val = ra + n;");
                w.line("luaH_setint(L, h, last--, val);");
                w.line("luaC_barrierback(L, h, val);");
            });
        }),
        Stmt::Closure { dst, index } => w.braced("", |w| {
            w.line(format!("Proto *p = cl->p->p[{index}];"));
            w.line("LClosure *ncl = luaV_getcached(p, cl->upvals, base);");
            w.line("if (ncl == NULL)");
            w.line(format!(
                "  luaV_pushclosure(L, p, cl->upvals, base, {});",
                reg(dst)
            ));
            w.line("else");
            w.line(format!("  setclLvalue(L, {}, ncl);", reg(dst)));
        }),
        Stmt::VarArg {
            dst,
            wanted,
            num_params,
        } => w.braced("", |w| {
            w.line(format!(
                "int n = cast_int(base - ci->func) - {num_params} - 1;"
            ));
            w.line("int j;");
            w.line(format!("int b = {};", count_or(wanted, "0")));
            w.line("if (n < 0)");
            w.line("  n = 0;");
            if wanted.is_none() {
                w.line("b = n;");
                w.line("luaD_checkstack(L, n);");
                w.line("base = ci->u.l.base;");
                w.line(format!("L->top = {} + n;", reg(dst)));
            }
            w.line("for (j = 0; j < b && j < n; j++)");
            w.line(format!("  setobjs2s(L, {} + j, base - n + j);", reg(dst)));
            w.line("for (; j < b; j++)");
            w.line(format!("  setnilvalue({} + j);", reg(dst)));
        }),
        Stmt::Compare { op, lhs, rhs } => {
            let f = match op {
                CompareOp::Eq => "luaV_equalobj",
                CompareOp::Lt => "luaV_lessthan",
                CompareOp::Le => "luaV_lessequal",
            };
            w.line(format!(
                "int cmp = {f}(L, {}, {});",
                operand(lhs),
                operand(rhs)
            ));
        }
        Stmt::CheckGc { limit } => w.line(format!("SELTRAN_CHECKGC(L, {});", reg(limit))),
    }
}

fn write_forprep(w: &mut CodeWriter, r: Reg) {
    w.braced("", |w| {
        w.line(format!("TValue *init = {};", reg(r)));
        w.line("TValue *plimit = init + 1;");
        w.line("TValue *pstep = init + 2;");
        w.line("lua_Integer ilimit;");
        w.line("int stopnow;");
        w.line("if (ttisinteger(init) && ttisinteger(pstep) &&");
        w.braced("    luaV_forlimit(plimit, &ilimit, ivalue(pstep), &stopnow))", |w| {
            w.line("lua_Integer initv = (stopnow ? 0 : ivalue(init));");
            w.line("setivalue(plimit, ilimit);");
            w.line("setivalue(init, intop(-, initv, ivalue(pstep)));");
        });
        w.braced("else", |w| {
            w.line("lua_Number ninit; lua_Number nlimit; lua_Number nstep;");
            w.line("if (!tonumber(plimit, &nlimit))");
            w.line("  luaG_runerror(L, \"'for' limit must be a number\");");
            w.line("setfltvalue(plimit, nlimit);");
            w.line("if (!tonumber(pstep, &nstep))");
            w.line("  luaG_runerror(L, \"'for' step must be a number\");");
            w.line("setfltvalue(pstep, nstep);");
            w.line("if (!tonumber(init, &ninit))");
            w.line("  luaG_runerror(L, \"'for' initial value must be a number\");");
            w.line("setfltvalue(init, luai_numsub(L, ninit, nstep));");
        });
    });
}

fn write_forstep(w: &mut CodeWriter, r: Reg) {
    // `jump` is read by the block's branch, so it lives at block scope.
    w.line("int jump = 0;");
    w.braced("", |w| {
        w.line(format!("TValue *ra = {};", reg(r)));
        w.braced("if (ttisinteger(ra))", |w| {
            w.line("lua_Integer step = ivalue(ra + 2);");
            w.line("lua_Integer idx = intop(+, ivalue(ra), step);");
            w.line("lua_Integer limit = ivalue(ra + 1);");
            w.braced("if ((0 < step) ? (idx <= limit) : (limit <= idx))", |w| {
                w.line("chgivalue(ra, idx);");
                w.line("setivalue(ra + 3, idx);");
                w.line("jump = 1;");
            });
        });
        w.braced("else", |w| {
            w.line("lua_Number step = fltvalue(ra + 2);");
            w.line("lua_Number idx = luai_numadd(L, fltvalue(ra), step);");
            w.line("lua_Number limit = fltvalue(ra + 1);");
            w.braced(
                "if (luai_numlt(0, step) ? luai_numle(idx, limit) : luai_numle(limit, idx))",
                |w| {
                    w.line("chgfltvalue(ra, idx);");
                    w.line("setfltvalue(ra + 3, idx);");
                    w.line("jump = 1;");
                },
            );
        });
    });
}

/// Integer-tier result expression over `ib`/`ic`.
fn integer_expr(op: ArithOp) -> Option<&'static str> {
    use ArithOp::*;
    Some(match op {
        Add => "intop(+, ib, ic)",
        Sub => "intop(-, ib, ic)",
        Mul => "intop(*, ib, ic)",
        Mod => "luaV_mod(L, ib, ic)",
        IDiv => "luaV_div(L, ib, ic)",
        BAnd => "intop(&, ib, ic)",
        BOr => "intop(|, ib, ic)",
        BXor => "intop(^, ib, ic)",
        Shl => "luaV_shiftl(ib, ic)",
        Shr => "luaV_shiftl(ib, -ic)",
        Unm => "intop(-, 0, ib)",
        BNot => "intop(^, ~l_castS2U(0), ib)",
        Pow | Div => return None,
    })
}

/// Float-tier statements over `nb`/`nc`.
fn float_body(op: ArithOp) -> Option<Vec<&'static str>> {
    use ArithOp::*;
    let set = |expr| vec![expr];
    Some(match op {
        Add => set("setfltvalue(ra, luai_numadd(L, nb, nc));"),
        Sub => set("setfltvalue(ra, luai_numsub(L, nb, nc));"),
        Mul => set("setfltvalue(ra, luai_nummul(L, nb, nc));"),
        Div => set("setfltvalue(ra, luai_numdiv(L, nb, nc));"),
        Pow => set("setfltvalue(ra, luai_numpow(L, nb, nc));"),
        IDiv => set("setfltvalue(ra, luai_numidiv(L, nb, nc));"),
        Unm => set("setfltvalue(ra, luai_numunm(L, nb));"),
        Mod => vec![
            "lua_Number m;",
            "luai_nummod(L, nb, nc, m);",
            "setfltvalue(ra, m);",
        ],
        BAnd | BOr | BXor | Shl | Shr | BNot => return None,
    })
}

/// One guarded arm: condition and body lines.
fn tier_arm(op: ArithOp, tier: Tier, unary: bool) -> Option<(String, Vec<String>)> {
    let both = |f: &dyn Fn(&str) -> String| {
        if unary {
            f("b")
        } else {
            format!("{} && {}", f("b"), f("c"))
        }
    };
    match tier {
        Tier::Integer => {
            let expr = integer_expr(op)?;
            let mut body = vec![if unary {
                "lua_Integer ib = ivalue(rb);".to_string()
            } else {
                "lua_Integer ib = ivalue(rb); lua_Integer ic = ivalue(rc);".to_string()
            }];
            body.push(format!("setivalue(ra, {expr});"));
            Some((both(&|x| format!("ttisinteger(r{x})")), body))
        }
        Tier::IntegerCoercible => {
            let expr = integer_expr(op)?;
            Some((
                both(&|x| format!("tointeger(r{x}, &i{x})")),
                vec![format!("setivalue(ra, {expr});")],
            ))
        }
        Tier::Float => {
            let body = float_body(op)?.into_iter().map(str::to_string).collect();
            Some((both(&|x| format!("tonumber(r{x}, &n{x})")), body))
        }
        Tier::Metamethod => None,
    }
}

fn write_arith(w: &mut CodeWriter, op: ArithOp, dst: Reg, lhs: &str, rhs: Option<&str>) {
    let unary = rhs.is_none();
    let tiers = op.tiers();
    w.braced("", |w| {
        w.line(format!("TValue *rb = {lhs};"));
        if let Some(rhs) = rhs {
            w.line(format!("TValue *rc = {rhs};"));
        }
        w.line(format!("TValue *ra = {};", reg(dst)));
        if tiers.contains(&Tier::Float) {
            w.line(if unary { "lua_Number nb;" } else { "lua_Number nb; lua_Number nc;" });
        }
        if tiers.contains(&Tier::IntegerCoercible) {
            w.line(if unary { "lua_Integer ib;" } else { "lua_Integer ib; lua_Integer ic;" });
        }

        let mut first = true;
        for &tier in tiers {
            let Some((guard, body)) = tier_arm(op, tier, unary) else {
                continue;
            };
            let keyword = if first { "if" } else { "else if" };
            first = false;
            w.braced(format!("{keyword} ({guard})"), |w| {
                for line in &body {
                    w.line(line);
                }
            });
        }
        // The metamethod fallback closes every chain; unary operators pass
        // their operand twice.
        let second = if unary { "rb" } else { "rc" };
        let call = format!("luaT_trybinTM(L, rb, {second}, ra, {});", op.event());
        if first {
            w.line(call);
        } else {
            w.braced("else", |w| w.line(&call));
        }
    });
}
