use super::*;

fn facts(source: &str) -> FileFacts {
    parse_source(source, "ts").expect("should parse").1
}

#[test]
fn test_module_metadata_resolves_wrappers() {
    let f = facts(
        r#"
import { Module, forwardRef } from '@nestjs/common';
import { TypeOrmModule } from '@nestjs/typeorm';

@Module({
    imports: [UsersModule, forwardRef(() => AuthModule), TypeOrmModule.forFeature([User])],
    controllers: [AppController],
    providers: [AppService, { provide: CONFIG, useValue: {} }],
    exports: [AppService],
})
export class AppModule {}
"#,
    );

    assert_eq!(f.classes.len(), 1);
    let class = &f.classes[0];
    assert_eq!(class.name, "AppModule");
    assert!(class.exported);
    assert!(class.is(DeclKind::Module));

    let module = class.module.as_ref().expect("module metadata");
    assert_eq!(module.imports, vec!["UsersModule", "AuthModule", "TypeOrmModule"]);
    assert_eq!(module.controllers, vec!["AppController"]);
    assert_eq!(module.providers, vec!["AppService", "CONFIG"]);
    assert_eq!(module.exports, vec!["AppService"]);
}

#[test]
fn test_classification_from_decorators_interfaces_and_names() {
    let f = facts(
        r#"
@Injectable()
export class RolesGuard implements CanActivate {
    canActivate(context: ExecutionContext): boolean {
        return true;
    }
}

export class ParseIdPipe {}

@Controller('users')
export class UsersController {}
"#,
    );

    let guard = f.class("RolesGuard").unwrap();
    assert_eq!(guard.kinds, vec![DeclKind::Injectable, DeclKind::Guard]);
    assert_eq!(guard.implements, vec!["CanActivate"]);
    assert!(guard.method("canActivate").is_some());

    let pipe = f.class("ParseIdPipe").unwrap();
    assert_eq!(pipe.kinds, vec![DeclKind::Pipe]);
    assert!(pipe.method("transform").is_none());

    let controller = f.class("UsersController").unwrap();
    assert!(controller.is(DeclKind::Controller));
    assert!(controller.decorator("Controller").unwrap().is_call);
}

#[test]
fn test_methods_and_constructor_params() {
    let f = facts(
        r#"
@Controller('users')
export class UsersController {
    constructor(
        private readonly usersService: UsersService,
        @InjectRepository(User) private repo: Repository<User>,
    ) {}

    @Get()
    async findAll(@Query() query: string) {
        return this.usersService.findAll(query);
    }

    static helper() {}
}
"#,
    );

    let class = &f.classes[0];
    assert_eq!(class.constructor_params.len(), 2);
    assert_eq!(class.constructor_params[0].name, "usersService");
    assert_eq!(
        class.constructor_params[0].type_name.as_deref(),
        Some("UsersService")
    );
    assert_eq!(class.constructor_params[1].decorators, vec!["InjectRepository"]);
    assert_eq!(
        class.constructor_params[1].type_name.as_deref(),
        Some("Repository<User>")
    );

    assert_eq!(class.methods.len(), 2);
    let find_all = class.method("findAll").unwrap();
    assert!(find_all.is_async);
    assert!(find_all.is_route_handler());
    assert_eq!(find_all.param_count, 1);
    assert!(class.method("helper").unwrap().is_static);
    assert!(class.method("constructor").is_none());
}

#[test]
fn test_calls_carry_enclosing_scope() {
    let f = facts(
        r#"
import * as fs from 'fs';

export class FilesService {
    read() {
        return fs.readFileSync('a.txt');
    }
}

eval('1 + 1');
"#,
    );

    let read = f.calls.iter().find(|c| c.callee == "fs.readFileSync").unwrap();
    assert_eq!(read.class.as_deref(), Some("FilesService"));
    assert_eq!(read.method.as_deref(), Some("read"));
    assert_eq!(read.line, 6);

    let eval = f.calls.iter().find(|c| c.callee == "eval").unwrap();
    assert!(eval.class.is_none());
    assert_eq!(eval.line, 10);
}

#[test]
fn test_literal_assignments_and_imports() {
    let f = facts(
        r#"
import { Injectable } from '@nestjs/common';
import jwt from 'jsonwebtoken';

const apiKey = "sk_live_123";
export class Config {
    secret = 'hunter2';
}
const options = { password: "pw" };
"#,
    );

    let names: Vec<&str> = f.literal_assignments.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["apiKey", "secret", "password"]);
    assert_eq!(f.literal_assignments[0].value, "sk_live_123");

    assert_eq!(f.imports.len(), 2);
    assert_eq!(f.imports[0].source, "@nestjs/common");
    assert_eq!(f.imports[0].names, vec!["Injectable"]);
    assert_eq!(f.imports[1].names, vec!["jwt"]);
}

#[test]
fn test_syntax_errors_are_recorded_not_fatal() {
    let (_, f) = parse_source("export class Broken {", "ts").unwrap();
    assert!(f.has_syntax_errors);

    let (_, ok) = parse_source("export class Fine {}", "ts").unwrap();
    assert!(!ok.has_syntax_errors);
}

#[test]
fn test_javascript_grammar() {
    let (_, f) = parse_source(
        "class AuthGuard extends Base {\n  canActivate() { return true; }\n}\n",
        "js",
    )
    .unwrap();
    let class = &f.classes[0];
    assert_eq!(class.name, "AuthGuard");
    assert_eq!(class.extends.as_deref(), Some("Base"));
    assert!(class.is(DeclKind::Guard));
    assert!(class.method("canActivate").is_some());
}

#[test]
fn test_deeply_nested_expressions_are_walked() {
    let depth = 5000;
    let source = format!(
        "export class Deep {{\n    run() {{\n        return {}eval('x'){};\n    }}\n}}\n",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    let f = facts(&source);

    assert!(!f.has_syntax_errors);
    assert!(f.class("Deep").is_some());
    let eval = f.calls.iter().find(|c| c.callee == "eval").unwrap();
    assert_eq!(eval.class.as_deref(), Some("Deep"));
    assert_eq!(eval.method.as_deref(), Some("run"));
    assert_eq!(eval.line, 3);
}

#[test]
fn test_calls_keep_document_order() {
    let f = facts("a();\nfunction f() { b(c()); }\nd();\n");
    let callees: Vec<&str> = f.calls.iter().map(|c| c.callee.as_str()).collect();
    assert_eq!(callees, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_columns_count_characters_not_bytes() {
    let f = facts("const s = 'é'; eval('x');\n");
    let eval = f.calls.iter().find(|c| c.callee == "eval").unwrap();
    assert_eq!(eval.column, 16);
    assert_eq!(column_at("é\nab", 4), 2);
    assert_eq!(column_at("日本", 6), 3);
}
