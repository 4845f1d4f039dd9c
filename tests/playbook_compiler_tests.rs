use rustle_converge::playbook::{CompileError, PlaybookCompiler, POSITIONAL_ARG};
use rustle_converge::runners::RunnerRegistry;
use serde_json::json;

fn compile(source: &str) -> Result<rustle_converge::playbook::Compilation, CompileError> {
    let registry = RunnerRegistry::with_core_runners();
    PlaybookCompiler::new(&registry).compile_str(source)
}

const SITE: &str = r#"
- name: web
  hosts: web1, web2
  vars:
    port: 8080
  pre_run:
    - make assets
  tasks:
    - name: install nginx
      apt: name=nginx state=present
      tags: packages
    - shell: echo {{ item }}
      loop: [one, two, three]
    - tree:
        src: files
        dst: /
        /etc/nginx: notify=reload
      notify: [reload]
  handlers:
    - name: reload
      service: name=nginx state=reloaded
"#;

#[test]
fn test_compile_site() {
    let compilation = compile(SITE).unwrap();
    assert!(compilation.warnings.is_empty(), "{:?}", compilation.warnings);

    let play = &compilation.playbook.plays[0];
    assert_eq!(play.hosts, vec!["web1", "web2"]);
    assert_eq!(play.vars["port"], json!(8080));
    assert_eq!(play.pre_run, vec!["make assets"]);
    assert_eq!(play.tasks.len(), 5);
    assert_eq!(play.handlers[0].name, "reload");

    let apt = &play.tasks[0];
    assert_eq!(apt.runner, "apt");
    assert_eq!(apt.arg_str("name"), Some("nginx"));
    assert_eq!(apt.arg_str(POSITIONAL_ARG), Some(""));
    assert_eq!(apt.tags, vec!["packages"]);

    let tree = &play.tasks[4];
    assert_eq!(tree.arg_str("/etc/nginx"), Some("notify=reload"));
    assert_eq!(tree.notify, vec!["reload"]);
}

#[test]
fn test_loop_expansion_preserves_count_and_order() {
    let play = &compile(SITE).unwrap().playbook.plays[0];
    let items: Vec<&serde_json::Value> = play.tasks[1..4].iter().map(|t| &t.vars["item"]).collect();
    assert_eq!(items, vec![&json!("one"), &json!("two"), &json!("three")]);
    for task in &play.tasks[1..4] {
        assert_eq!(task.runner, "shell");
        assert!(task.loop_items.is_empty());
        assert_eq!(task.arg_str(POSITIONAL_ARG), Some("echo {{ item }}"));
    }
}

#[test]
fn test_duplicate_runner_names_both_keys() {
    let source = "- hosts: h\n  tasks:\n    - shell: echo a\n      command: echo b\n";
    let err = compile(source).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, CompileError::DuplicateRunner { .. }));
    assert!(message.contains("shell") && message.contains("command"), "{message}");
}

#[test]
fn test_unknown_runner_rejected() {
    assert!(compile("- hosts: h\n  tasks:\n    - frobnicate: now\n").is_err());
    assert!(matches!(
        compile("- hosts: h\n  tasks:\n    - name: nothing\n").unwrap_err(),
        CompileError::MissingRunner { .. }
    ));
}

#[test]
fn test_hosts_accept_mixed_forms() {
    let compilation = compile("- hosts: [a, 'b, c']\n  tasks: []\n").unwrap();
    assert_eq!(compilation.playbook.plays[0].hosts, vec!["a", "b", "c"]);
}

#[test]
fn test_top_level_must_be_sequence() {
    assert!(matches!(
        compile("hosts: web1\n").unwrap_err(),
        CompileError::Malformed { .. }
    ));
}

#[test]
fn test_unknown_play_key_is_a_warning() {
    let compilation = compile("- hosts: h\n  become: yes\n  tasks: []\n").unwrap();
    assert_eq!(compilation.warnings.len(), 1);
}
