//! Reader tests: expansion, conditions, control flow and node finalization

use std::path::Path;

use tempfile::TempDir;

use super::reader::{read_script, read_script_text, ReadOptions};
use super::schema::Schema;
use crate::graph::{Graph, Severity};
use crate::task::TaskRegistry;

fn parse_at(text: &str, root_dir: &Path, overrides: &[(&str, &str)]) -> anyhow::Result<Graph> {
    let registry = TaskRegistry::with_builtin_tasks();
    let schema = Schema::build(&registry);
    let overrides: Vec<(String, String)> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let opts = ReadOptions {
        registry: &registry,
        schema: &schema,
        root_dir,
        default_properties: &[],
        overrides: &overrides,
    };
    read_script_text(text, Path::new("test.graph.xml"), &opts)
}

fn parse(text: &str) -> anyhow::Result<Graph> {
    let temp = TempDir::new().unwrap();
    parse_at(text, temp.path(), &[])
}

#[test]
fn test_minimal_node() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux;Mac">
                <Node Name="Compile">
                    <Log Message="compiling"/>
                </Node>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert_eq!(graph.agents.len(), 1);
    assert_eq!(graph.agents[0].types, vec!["Linux", "Mac"]);
    let node = graph.node("Compile").unwrap();
    assert_eq!(node.outputs.len(), 1);
    assert_eq!(node.outputs[0].tag, "#Compile");
    assert_eq!(node.tasks.len(), 1);
}

#[test]
fn test_property_expansion_in_attributes() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Property Name="Config" Value="Shipping"/>
            <Agent Name="Main" Type="Linux">
                <Node Name="Build-$(Config)"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("Build-Shipping").is_some());
}

#[test]
fn test_option_override_beats_default() {
    let temp = TempDir::new().unwrap();
    let text = r#"
        <BuildGraph>
            <Option Name="Config" DefaultValue="Debug" Description="Build config"/>
            <Agent Name="Main" Type="Linux">
                <Node Name="Build-$(Config)"/>
            </Agent>
        </BuildGraph>
    "#;
    let defaulted = parse_at(text, temp.path(), &[]).unwrap();
    assert!(defaulted.node("Build-Debug").is_some());

    let overridden = parse_at(text, temp.path(), &[("Config", "Shipping")]).unwrap();
    assert!(overridden.node("Build-Shipping").is_some());
}

#[test]
fn test_if_skips_subtree() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="Always"/>
            </Agent>
            <Agent Name="Skipped" Type="Linux" If="false">
                <Node Name="Never"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("Always").is_some());
    assert!(graph.node("Never").is_none());
    assert_eq!(graph.agents.len(), 1);
}

#[test]
fn test_condition_on_expanded_property() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Property Name="Platform" Value="Linux"/>
            <Agent Name="Main" Type="Linux">
                <Node Name="LinuxOnly" If="'$(Platform)' == 'linux'"/>
                <Node Name="WinOnly" If="'$(Platform)' == 'Win64'"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("LinuxOnly").is_some());
    assert!(graph.node("WinOnly").is_none());
}

#[test]
fn test_for_each_unrolls() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <ForEach Name="Platform" Values="Win64;Linux;Mac">
                    <Node Name="Compile$(Platform)"/>
                </ForEach>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    let names: Vec<&str> = graph.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["CompileWin64", "CompileLinux", "CompileMac"]);
}

#[test]
fn test_for_each_scope_is_popped() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Property Name="X" Value="outer"/>
            <ForEach Name="X" Values="inner">
                <Property Name="Seen" Value="$(X)"/>
            </ForEach>
            <Agent Name="Main" Type="Linux">
                <Node Name="After-$(X)"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("After-outer").is_some());
}

#[test]
fn test_switch_takes_first_true_case() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Property Name="Mode" Value="Fast"/>
            <Agent Name="Main" Type="Linux">
                <Switch>
                    <Case If="'$(Mode)' == 'Slow'">
                        <Node Name="SlowNode"/>
                    </Case>
                    <Case If="'$(Mode)' == 'Fast'">
                        <Node Name="FastNode"/>
                    </Case>
                    <Default>
                        <Node Name="DefaultNode"/>
                    </Default>
                </Switch>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    let names: Vec<&str> = graph.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["FastNode"]);
}

#[test]
fn test_switch_default_when_no_case_matches() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Switch>
                    <Case If="false"><Node Name="A"/></Case>
                    <Default><Node Name="B"/></Default>
                </Switch>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("B").is_some());
    assert!(graph.node("A").is_none());
}

#[test]
fn test_macro_expand_with_arguments() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Macro Name="CompileNode" Arguments="Platform" OptionalArguments="Suffix">
                <Node Name="Compile$(Platform)$(Suffix)">
                    <Log Message="building $(Platform)"/>
                </Node>
            </Macro>
            <Agent Name="Main" Type="Linux">
                <Expand Name="CompileNode" Platform="Win64"/>
                <Expand Name="CompileNode" Platform="Linux" Suffix="-Server"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("CompileWin64").is_some());
    assert!(graph.node("CompileLinux-Server").is_some());
}

#[test]
fn test_macro_missing_required_argument_fails() {
    let err = parse(
        r#"
        <BuildGraph>
            <Macro Name="M" Arguments="Arg">
                <Property Name="X" Value="$(Arg)"/>
            </Macro>
            <Expand Name="M"/>
        </BuildGraph>
        "#,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("requires argument"), "{err}");
}

#[test]
fn test_undefined_macro_fails() {
    assert!(parse(r#"<BuildGraph><Expand Name="Nope"/></BuildGraph>"#).is_err());
}

#[test]
fn test_requires_by_tag_and_node_name() {
    let graph = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" Produces="#Out"/>
                <Node Name="B" Requires="#Out"/>
                <Node Name="C" Requires="A;B"/>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap();
    assert_eq!(graph.node("B").unwrap().inputs, vec!["#Out"]);
    assert_eq!(graph.node("C").unwrap().inputs, vec!["#A", "#B"]);
}

#[test]
fn test_requires_undefined_tag_fails() {
    let err = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="B" Requires="#Missing"/>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("#Missing"), "{err}");
}

#[test]
fn test_duplicate_tag_producer_fails() {
    let err = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" Produces="#Out"/>
                <Node Name="B" Produces="#Out"/>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("already has a producer"), "{err}");
}

#[test]
fn test_duplicate_node_name_fails() {
    assert!(parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A"/>
                <Node Name="A"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .is_err());
}

#[test]
fn test_task_tag_param_becomes_input() {
    let graph = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" Produces="#Binaries">
                    <WriteTextFile File="a.txt" Text="x" Tag="#Binaries"/>
                </Node>
                <Node Name="B">
                    <Copy Files="#Binaries" To="staging"/>
                </Node>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap();
    assert_eq!(graph.node("B").unwrap().inputs, vec!["#Binaries"]);
}

#[test]
fn test_local_scratch_tag_is_not_an_input() {
    let graph = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A">
                    <WriteTextFile File="a.txt" Text="x" Tag="#Scratch"/>
                    <Copy Files="#Scratch" To="staging"/>
                </Node>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap();
    assert!(graph.node("A").unwrap().inputs.is_empty());
}

#[test]
fn test_task_consuming_unknown_tag_fails() {
    let err = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A">
                    <Copy Files="#Nowhere" To="staging"/>
                </Node>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("#Nowhere"), "{err}");
}

#[test]
fn test_writing_another_nodes_tag_fails() {
    let err = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" Produces="#Out"/>
                <Node Name="B">
                    <WriteTextFile File="b.txt" Text="x" Tag="#Out"/>
                </Node>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("cannot be written"), "{err}");
}

#[test]
fn test_forward_reference_fails() {
    // References resolve in document order, so a node cannot name a tag
    // produced later; this also makes dependency cycles unexpressible.
    let err = parse(
        r##"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" Produces="#AOut">
                    <Copy Files="#BOut" To="x"/>
                </Node>
                <Node Name="B" Produces="#BOut" Requires="#AOut"/>
            </Agent>
        </BuildGraph>
        "##,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("#BOut"), "{err}");
}

#[test]
fn test_aggregate_resolves_members() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A"/>
                <Node Name="B"/>
            </Agent>
            <Aggregate Name="Everything" Requires="A;B"/>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert_eq!(graph.aggregates["Everything"], vec!["A", "B"]);
}

#[test]
fn test_trigger_nesting_and_node_assignment() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A"/>
            </Agent>
            <Trigger Name="PostSubmit">
                <Agent Name="Late" Type="Linux">
                    <Node Name="D" Requires="A"/>
                </Agent>
                <Trigger Name="Nightly">
                    <Agent Name="Nightlies" Type="Linux">
                        <Node Name="E" Requires="D"/>
                    </Agent>
                </Trigger>
            </Trigger>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert_eq!(graph.node("A").unwrap().trigger, None);
    assert_eq!(graph.node("D").unwrap().trigger.as_deref(), Some("PostSubmit"));
    assert_eq!(graph.node("E").unwrap().trigger.as_deref(), Some("Nightly"));
    assert_eq!(
        graph.trigger("Nightly").unwrap().parent.as_deref(),
        Some("PostSubmit")
    );
}

#[test]
fn test_cross_sibling_trigger_dependency_fails() {
    let err = parse(
        r#"
        <BuildGraph>
            <Trigger Name="T1">
                <Agent Name="A1" Type="Linux"><Node Name="D"/></Agent>
            </Trigger>
            <Trigger Name="T2">
                <Agent Name="A2" Type="Linux"><Node Name="E" Requires="D"/></Agent>
            </Trigger>
        </BuildGraph>
        "#,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("behind trigger"), "{err}");
}

#[test]
fn test_warning_and_error_are_buffered() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Warning Message="global warning"/>
            <Trigger Name="PostSubmit">
                <Error Message="triggered error"/>
            </Trigger>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert_eq!(graph.diagnostics.len(), 2);
    assert_eq!(graph.diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        graph.diagnostics[1].enclosing_trigger.as_deref(),
        Some("PostSubmit")
    );
}

#[test]
fn test_notify_sets_recipients() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A"/>
                <Node Name="B"/>
            </Agent>
            <Notify Targets="A;B" Users="dev@example.com" Warnings="false"/>
        </BuildGraph>
        "#,
    )
    .unwrap();
    let node = graph.node("A").unwrap();
    assert_eq!(node.notify, vec!["dev@example.com"]);
    assert!(!node.notify_on_warnings);
}

#[test]
fn test_token_and_annotation_on_node() {
    let graph = parse(
        r#"
        <BuildGraph>
            <Agent Name="Main" Type="Linux">
                <Node Name="A">
                    <Token Path="/locks/editor.lock"/>
                    <Annotation Name="Owner" Value="build-team"/>
                </Node>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    let node = graph.node("A").unwrap();
    assert_eq!(node.tokens.len(), 1);
    assert_eq!(node.annotations["Owner"], "build-team");
}

#[test]
fn test_unknown_element_fails() {
    assert!(parse(r#"<BuildGraph><Widget Name="x"/></BuildGraph>"#).is_err());
}

#[test]
fn test_unknown_attribute_fails() {
    assert!(parse(r#"<BuildGraph><Agent Name="A" Color="red"/></BuildGraph>"#).is_err());
}

#[test]
fn test_env_var_import() {
    // HOME is defined in any sane test environment
    let graph = parse(
        r#"
        <BuildGraph>
            <EnvVar Name="HOME"/>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" If="'$(HOME)' != ''"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();
    assert!(graph.node("A").is_some());
}

#[test]
fn test_include_shares_environment() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("common.graph.xml"),
        r#"<BuildGraph><Property Name="Shared" Value="yes"/></BuildGraph>"#,
    )
    .unwrap();
    std::fs::write(
        temp.path().join("main.graph.xml"),
        r#"
        <BuildGraph>
            <Include Script="common.graph.xml"/>
            <Agent Name="Main" Type="Linux">
                <Node Name="Node-$(Shared)"/>
            </Agent>
        </BuildGraph>
        "#,
    )
    .unwrap();

    let registry = TaskRegistry::with_builtin_tasks();
    let schema = Schema::build(&registry);
    let opts = ReadOptions {
        registry: &registry,
        schema: &schema,
        root_dir: temp.path(),
        default_properties: &[],
        overrides: &[],
    };
    let graph = read_script(&temp.path().join("main.graph.xml"), &opts).unwrap();
    assert!(graph.node("Node-yes").is_some());
}

#[test]
fn test_preprocess_round_trip() {
    let source = r##"
        <BuildGraph>
            <Property Name="Dir" Value="staging"/>
            <Agent Name="Main" Type="Linux">
                <Node Name="A" Produces="#Binaries">
                    <WriteTextFile File="a.txt" Text="x" Tag="#Binaries"/>
                </Node>
            </Agent>
            <Agent Name="Second" Type="Mac">
                <Node Name="B" Requires="#Binaries" After="A">
                    <Copy Files="#Binaries" To="$(Dir)"/>
                    <Token Path="/locks/b.lock"/>
                    <Annotation Name="Owner" Value="qa"/>
                </Node>
            </Agent>
            <Aggregate Name="All" Requires="A;B"/>
            <Notify Targets="B" Users="qa@example.com" Warnings="true"/>
        </BuildGraph>
    "##;
    let first = parse(source).unwrap();
    let rendered = crate::script::preprocess::render(&first);
    let second = parse(&rendered).unwrap();

    let first_names: Vec<&str> = first.nodes().map(|n| n.name.as_str()).collect();
    let second_names: Vec<&str> = second.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(first_names, second_names);
    assert_eq!(
        first.node("B").unwrap().inputs,
        second.node("B").unwrap().inputs
    );
    assert_eq!(
        first.node("B").unwrap().after,
        second.node("B").unwrap().after
    );
    assert_eq!(
        first.node("B").unwrap().notify,
        second.node("B").unwrap().notify
    );
    assert_eq!(first.aggregates, second.aggregates);
    // Task attributes survive verbatim
    assert_eq!(
        first.node("B").unwrap().tasks[0].attrs,
        second.node("B").unwrap().tasks[0].attrs
    );
}
