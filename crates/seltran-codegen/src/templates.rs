//! Fixed text around the generated functions.

/// Host headers and the helper macros the generated statements use.
///
/// The table and GC helpers do not re-read `base` themselves: the emitter
/// writes an explicit refresh after each of them.
pub const PREAMBLE: &str = r#"#include "lprefix.h"

#include <stdio.h>
#include <stdlib.h>

#include "lua.h"
#include "lauxlib.h"

#include "ldebug.h"
#include "ldo.h"
#include "lfunc.h"
#include "lgc.h"
#include "lobject.h"
#include "lopcodes.h"
#include "lstate.h"
#include "lstring.h"
#include "ltable.h"
#include "ltm.h"
#include "lvm.h"

#define SELTRAN_GETTABLE(L,t,key,v) { const TValue *slot; \
  if (luaV_fastget(L,t,key,slot,luaH_get)) { setobj2s(L, v, slot); } \
  else luaV_finishget(L,t,key,v,slot); }

#define SELTRAN_SETTABLE(L,t,key,v) { const TValue *slot; \
  if (!luaV_fastset(L,t,key,slot,luaH_get,v)) \
    luaV_finishset(L,t,key,v,slot); }

/* 'c' is the limit of live values */
#define SELTRAN_CHECKGC(L,c) \
  { luaC_condGC(L, L->top = (c), L->top = ci->top); \
    luai_threadyield(L); }

#define SELTRAN_STR_(x) #x
#define SELTRAN_STR(x) SELTRAN_STR_(x)
#define SELTRAN_CAT_(a,b) a##b
#define SELTRAN_CAT(a,b) SELTRAN_CAT_(a,b)
"#;

/// Module entry point: recompile the embedded source, check the tree against
/// the dispatch table, install the generated functions in preorder and run
/// the main chunk.
pub const POSTAMBLE: &str = r#"#define SELTRAN_LUAOPEN SELTRAN_CAT(luaopen_, SELTRAN_MODULE_NAME)

static void seltran_fatal (const char *what, const char *detail)
{
  fprintf(stderr, "%s: %s: %s\n", SELTRAN_STR(SELTRAN_MODULE_NAME), what,
          detail ? detail : "(no message)");
  abort();
}

static int seltran_count (const Proto *f)
{
  int n = 1;
  int i;
  for (i = 0; i < f->sizep; i++)
    n += seltran_count(f->p[i]);
  return n;
}

/* Same numbering as the translator: self first, then children in order. */
static void seltran_install (Proto *f, int *next)
{
  int i;
  f->aot_implementation = seltran_functions[(*next)++];
  for (i = 0; i < f->sizep; i++)
    seltran_install(f->p[i], next);
}

LUAMOD_API int SELTRAN_LUAOPEN (lua_State *L)
{
  Proto *root;
  int next = 0;
  int status = luaL_loadbuffer(L, (const char *) SELTRAN_SOURCE,
                               SELTRAN_SOURCE_LEN, SELTRAN_CHUNKNAME);
  switch (status) {
    case LUA_OK:
      break;
    case LUA_ERRSYNTAX:
      seltran_fatal("syntax error in embedded source", lua_tostring(L, -1));
      break;
    case LUA_ERRMEM:
      seltran_fatal("not enough memory to load embedded source", NULL);
      break;
    case LUA_ERRGCMM:
      seltran_fatal("error in __gc metamethod while loading", lua_tostring(L, -1));
      break;
    default:
      seltran_fatal("cannot load embedded source", lua_tostring(L, -1));
      break;
  }

  root = getproto(L->top - 1);
  if (seltran_count(root) != SELTRAN_NFUNCTIONS)
    seltran_fatal("prototype count mismatch", "embedded source does not match the translated code");
  seltran_install(root, &next);

  lua_call(L, 0, 1);
  return 1;
}
"#;
