use log::info;
use maplit::btreemap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use stack_string::{StackString, format_sstr};
use std::{
    collections::BTreeMap,
    env::var,
    fs,
    path::{Path, PathBuf},
};

use crate::errors::ElsaLibError;

pub const STACK_NAME: &str = "HtsgetElsaLambdaStack";
pub const STACK_DESCRIPTION: &str = "A stack deploying htsget-elsa-lambda with API gateway.";
pub const STACK_TAG_KEY: &str = "Stack";

pub const ACCOUNT_VARIABLE: &str = "CDK_DEFAULT_ACCOUNT";
pub const REGION_VARIABLE: &str = "CDK_DEFAULT_REGION";
pub const OUTDIR_VARIABLE: &str = "CDK_OUTDIR";
pub const DEFAULT_OUTDIR: &str = "cdk.out";

pub const CLOUD_ASSEMBLY_VERSION: &str = "36.0.0";
pub const MANIFEST_FILE: &str = "manifest.json";

const MAX_STACK_NAME_LENGTH: usize = 128;
const MAX_DESCRIPTION_LENGTH: usize = 1024;
const MAX_TAGS: usize = 50;
const MAX_TAG_KEY_LENGTH: usize = 128;
const MAX_TAG_VALUE_LENGTH: usize = 256;

const FUNCTION_ID: &str = "HtsgetElsaLambdaFunction";
const ROLE_ID: &str = "HtsgetElsaLambdaRole";
const API_ID: &str = "HtsgetElsaHttpApi";
const INTEGRATION_ID: &str = "HtsgetElsaIntegration";

/// Target account and region. Either may be absent, leaving resolution to deploy time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<StackString>,
    pub region: Option<StackString>,
}

impl Environment {
    /// Reads `CDK_DEFAULT_ACCOUNT` and `CDK_DEFAULT_REGION`. Never fails; unset
    /// or non-unicode variables are `None`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| var(name).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            account: lookup(ACCOUNT_VARIABLE).map(Into::into),
            region: lookup(REGION_VARIABLE).map(Into::into),
        }
    }

    /// Environment string in the cloud assembly, e.g. `aws://111111111111/us-east-1`.
    #[must_use]
    pub fn assembly_environment(&self) -> StackString {
        format_sstr!(
            "aws://{}/{}",
            self.account.as_ref().map_or("unknown-account", StackString::as_str),
            self.region.as_ref().map_or("unknown-region", StackString::as_str)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackProps {
    pub stack_name: StackString,
    pub description: StackString,
    pub tags: BTreeMap<StackString, StackString>,
    pub env: Environment,
}

impl StackProps {
    #[must_use]
    pub fn htsget_elsa_lambda(env: Environment) -> Self {
        Self {
            stack_name: STACK_NAME.into(),
            description: STACK_DESCRIPTION.into(),
            tags: btreemap! {
                STACK_TAG_KEY.into() => STACK_NAME.into(),
            },
            env,
        }
    }

    fn validate(&self) -> Result<(), ElsaLibError> {
        let invalid = |msg: StackString| -> Result<(), ElsaLibError> {
            Err(ElsaLibError::InvalidStackConfig(msg))
        };

        let name = self.stack_name.as_str();
        if name.is_empty()
            || name.len() > MAX_STACK_NAME_LENGTH
            || !name.starts_with(|c: char| c.is_ascii_alphabetic())
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return invalid(format_sstr!(
                "stack name {name} must start with a letter and contain only alphanumerics and hyphens"
            ));
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            return invalid(format_sstr!(
                "description is longer than {MAX_DESCRIPTION_LENGTH} characters"
            ));
        }
        if self.tags.len() > MAX_TAGS {
            return invalid(format_sstr!("more than {MAX_TAGS} tags"));
        }
        for (key, value) in &self.tags {
            if key.is_empty() || key.len() > MAX_TAG_KEY_LENGTH || key.starts_with("aws:") {
                return invalid(format_sstr!("invalid tag key {key}"));
            }
            if value.len() > MAX_TAG_VALUE_LENGTH {
                return invalid(format_sstr!("tag {key} value is too long"));
            }
        }
        if let Some(account) = &self.env.account {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return invalid(format_sstr!("account {account} is not a 12 digit id"));
            }
        }
        if let Some(region) = &self.env.region {
            if region.is_empty()
                || !region
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                return invalid(format_sstr!("region {region} is not a valid region"));
            }
        }
        Ok(())
    }

    fn tag_list(&self) -> Value {
        self.tags
            .iter()
            .map(|(key, value)| json!({"Key": key, "Value": value}))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Stack {
    id: StackString,
    props: StackProps,
    template: Value,
}

impl Stack {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn props(&self) -> &StackProps {
        &self.props
    }

    #[must_use]
    pub fn template(&self) -> &Value {
        &self.template
    }

    #[must_use]
    pub fn template_file(&self) -> StackString {
        format_sstr!("{}.template.json", self.id)
    }
}

/// Orchestration context collecting stacks until synthesis.
#[derive(Debug)]
pub struct App {
    outdir: PathBuf,
    stacks: Vec<Stack>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CloudAssembly {
    pub directory: PathBuf,
    pub manifest: Value,
}

impl App {
    /// Output directory from `CDK_OUTDIR`, `cdk.out` otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::with_outdir(var(OUTDIR_VARIABLE).map_or_else(|_| DEFAULT_OUTDIR.into(), PathBuf::from))
    }

    pub fn with_outdir(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
            stacks: Vec::new(),
        }
    }

    #[must_use]
    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    fn register(&mut self, stack: Stack) -> Result<&Stack, ElsaLibError> {
        if stack.id.is_empty() {
            return Err(ElsaLibError::InvalidStackConfig("stack id is empty".into()));
        }
        if self.stacks.iter().any(|s| s.id == stack.id) {
            return Err(ElsaLibError::DuplicateStack(stack.id));
        }
        self.stacks.push(stack);
        self.stacks
            .last()
            .ok_or(ElsaLibError::StaticCustomError("stack registration failed"))
    }

    #[must_use]
    pub fn manifest(&self) -> Value {
        let artifacts: Map<String, Value> = self
            .stacks
            .iter()
            .map(|stack| {
                let props = stack.props();
                let artifact = json!({
                    "type": "aws:cloudformation:stack",
                    "environment": props.env.assembly_environment(),
                    "properties": {
                        "templateFile": stack.template_file(),
                        "stackName": props.stack_name,
                        "description": props.description,
                        "tags": props.tags,
                    },
                });
                (stack.id.to_string(), artifact)
            })
            .collect();
        json!({
            "version": CLOUD_ASSEMBLY_VERSION,
            "artifacts": artifacts,
        })
    }

    /// Write every stack template and the assembly manifest to the output directory.
    ///
    /// # Errors
    /// Returns error if the output directory or any file cannot be written
    pub fn synth(&self) -> Result<CloudAssembly, ElsaLibError> {
        fs::create_dir_all(&self.outdir)?;
        for stack in &self.stacks {
            let path = self.outdir.join(stack.template_file().as_str());
            fs::write(&path, serde_json::to_vec_pretty(stack.template())?)?;
            info!("wrote template {}", path.display());
        }
        let manifest = self.manifest();
        let path = self.outdir.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;
        info!("wrote manifest {}", path.display());
        Ok(CloudAssembly {
            directory: self.outdir.clone(),
            manifest,
        })
    }
}

/// Lambda function behind an API Gateway HTTP API serving the htsget routes.
pub struct HtsgetElsaLambdaStack;

impl HtsgetElsaLambdaStack {
    /// # Errors
    /// Returns error if the props would be rejected by CloudFormation or `id` is already registered
    pub fn new<'a>(app: &'a mut App, id: &str, props: StackProps) -> Result<&'a Stack, ElsaLibError> {
        props.validate()?;
        let template = Self::template(&props);
        app.register(Stack {
            id: id.into(),
            props,
            template,
        })
    }

    fn template(props: &StackProps) -> Value {
        let tag_list = props.tag_list();

        let mut resources = Map::new();
        resources.insert(
            ROLE_ID.into(),
            json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": {"Service": "lambda.amazonaws.com"},
                            "Action": "sts:AssumeRole",
                        }],
                    },
                    "ManagedPolicyArns": [{
                        "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
                    }],
                    "Policies": [{
                        "PolicyName": "HtsgetElsaS3Access",
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [
                                {
                                    "Effect": "Allow",
                                    "Action": ["s3:GetObject", "s3:PutObject"],
                                    "Resource": {"Fn::Sub": "arn:${AWS::Partition}:s3:::${CacheBucket}/*"},
                                },
                                {
                                    "Effect": "Allow",
                                    "Action": ["s3:GetObject"],
                                    "Resource": {"Fn::Sub": "arn:${AWS::Partition}:s3:::*/*"},
                                },
                            ],
                        },
                    }],
                    "Tags": tag_list,
                },
            }),
        );
        resources.insert(
            FUNCTION_ID.into(),
            json!({
                "Type": "AWS::Lambda::Function",
                "Properties": {
                    "Code": {
                        "S3Bucket": {"Ref": "LambdaCodeBucket"},
                        "S3Key": {"Ref": "LambdaCodeKey"},
                    },
                    "Handler": "bootstrap",
                    "Runtime": "provided.al2023",
                    "Architectures": ["arm64"],
                    "MemorySize": 128,
                    "Timeout": 28,
                    "Role": {"Fn::GetAtt": [ROLE_ID, "Arn"]},
                    "Environment": {
                        "Variables": {
                            "ELSA_ENDPOINT_AUTHORITY": {"Ref": "ElsaEndpointAuthority"},
                            "CACHE_LOCATION": {"Ref": "CacheBucket"},
                            "RUST_LOG": "info",
                        },
                    },
                    "Tags": tag_list,
                },
            }),
        );
        resources.insert(
            API_ID.into(),
            json!({
                "Type": "AWS::ApiGatewayV2::Api",
                "Properties": {
                    "Name": props.stack_name,
                    "ProtocolType": "HTTP",
                    "CorsConfiguration": {
                        "AllowOrigins": ["*"],
                        "AllowMethods": ["GET", "OPTIONS"],
                        "MaxAge": 2_592_000,
                    },
                    "Tags": props.tags,
                },
            }),
        );
        resources.insert(
            INTEGRATION_ID.into(),
            json!({
                "Type": "AWS::ApiGatewayV2::Integration",
                "Properties": {
                    "ApiId": {"Ref": API_ID},
                    "IntegrationType": "AWS_PROXY",
                    "IntegrationUri": {"Fn::GetAtt": [FUNCTION_ID, "Arn"]},
                    "PayloadFormatVersion": "2.0",
                },
            }),
        );
        for (route_id, route_key) in [
            ("ReadsServiceInfoRoute", "GET /reads/service-info"),
            ("VariantsServiceInfoRoute", "GET /variants/service-info"),
            ("ReadsRoute", "GET /reads/{id+}"),
            ("VariantsRoute", "GET /variants/{id+}"),
        ] {
            resources.insert(
                format!("HtsgetElsa{route_id}"),
                json!({
                    "Type": "AWS::ApiGatewayV2::Route",
                    "Properties": {
                        "ApiId": {"Ref": API_ID},
                        "RouteKey": route_key,
                        "Target": {"Fn::Join": ["/", ["integrations", {"Ref": INTEGRATION_ID}]]},
                    },
                }),
            );
        }
        resources.insert(
            "HtsgetElsaDefaultStage".into(),
            json!({
                "Type": "AWS::ApiGatewayV2::Stage",
                "Properties": {
                    "ApiId": {"Ref": API_ID},
                    "StageName": "$default",
                    "AutoDeploy": true,
                    "Tags": props.tags,
                },
            }),
        );
        resources.insert(
            "HtsgetElsaInvokePermission".into(),
            json!({
                "Type": "AWS::Lambda::Permission",
                "Properties": {
                    "Action": "lambda:InvokeFunction",
                    "FunctionName": {"Ref": FUNCTION_ID},
                    "Principal": "apigateway.amazonaws.com",
                    "SourceArn": {
                        "Fn::Sub": format_sstr!(
                            "arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{API_ID}}}/*/*"
                        ),
                    },
                },
            }),
        );

        json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": props.description,
            "Parameters": {
                "ElsaEndpointAuthority": {
                    "Type": "String",
                    "Description": "Host and optional port of the Elsa Data instance.",
                },
                "CacheBucket": {
                    "Type": "String",
                    "Description": "Bucket holding cached resolvers.",
                },
                "LambdaCodeBucket": {
                    "Type": "String",
                    "Description": "Bucket holding the htsget-elsa-lambda bootstrap zip.",
                },
                "LambdaCodeKey": {
                    "Type": "String",
                    "Description": "Key of the htsget-elsa-lambda bootstrap zip.",
                },
            },
            "Resources": resources,
            "Outputs": {
                "HtsgetElsaApiEndpoint": {
                    "Value": {"Fn::GetAtt": [API_ID, "ApiEndpoint"]},
                },
            },
        })
    }
}

/// Register the single `HtsgetElsaLambdaStack` with the app.
///
/// # Errors
/// Returns error if the stack rejects the environment or is already registered
pub fn register_htsget_elsa_stack(
    app: &mut App,
    env: Environment,
) -> Result<&Stack, ElsaLibError> {
    HtsgetElsaLambdaStack::new(app, STACK_NAME, StackProps::htsget_elsa_lambda(env))
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use stack_string::StackString;
    use std::{
        collections::HashMap,
        env::{remove_var, set_var, var},
        fs,
    };
    use tempfile::TempDir;

    use crate::{
        errors::ElsaLibError,
        stack::{
            ACCOUNT_VARIABLE, App, Environment, MANIFEST_FILE, REGION_VARIABLE,
            STACK_DESCRIPTION, STACK_NAME, STACK_TAG_KEY, StackProps, register_htsget_elsa_stack,
        },
    };

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Environment::from_lookup(|name| vars.get(name).cloned())
    }

    fn assert_single_registration(app: &App) {
        assert_eq!(app.stacks().len(), 1);
        let stack = &app.stacks()[0];
        assert_eq!(stack.id(), STACK_NAME);
        assert_eq!(stack.props().stack_name, STACK_NAME);
        assert_eq!(stack.props().description, STACK_DESCRIPTION);
        assert_eq!(stack.props().tags.len(), 1);
        assert_eq!(
            stack.props().tags.get(STACK_TAG_KEY).map(|v| v.as_str()),
            Some(STACK_NAME)
        );
    }

    #[test]
    fn test_register_with_both_variables() -> Result<(), Error> {
        let env = environment(&[
            (ACCOUNT_VARIABLE, "111111111111"),
            (REGION_VARIABLE, "us-east-1"),
        ]);
        let mut app = App::with_outdir("unused");
        register_htsget_elsa_stack(&mut app, env)?;

        assert_single_registration(&app);
        let env = &app.stacks()[0].props().env;
        assert_eq!(env.account.as_ref().map(StackString::as_str), Some("111111111111"));
        assert_eq!(env.region.as_ref().map(StackString::as_str), Some("us-east-1"));
        assert_eq!(env.assembly_environment(), "aws://111111111111/us-east-1");
        Ok(())
    }

    #[test]
    fn test_register_with_partial_environment() -> Result<(), Error> {
        let mut app = App::with_outdir("unused");
        register_htsget_elsa_stack(&mut app, environment(&[(REGION_VARIABLE, "ap-southeast-2")]))?;
        assert_single_registration(&app);
        let env = &app.stacks()[0].props().env;
        assert_eq!(env.account, None);
        assert_eq!(env.region.as_ref().map(StackString::as_str), Some("ap-southeast-2"));
        assert_eq!(
            env.assembly_environment(),
            "aws://unknown-account/ap-southeast-2"
        );
        Ok(())
    }

    #[test]
    fn test_register_without_environment() -> Result<(), Error> {
        let env = environment(&[]);
        assert_eq!(env, Environment::default());

        let mut app = App::with_outdir("unused");
        register_htsget_elsa_stack(&mut app, env)?;
        assert_single_registration(&app);
        let env = &app.stacks()[0].props().env;
        assert!(env.account.is_none());
        assert!(env.region.is_none());
        Ok(())
    }

    #[test]
    fn test_environment_from_env() {
        let saved: Vec<_> = [ACCOUNT_VARIABLE, REGION_VARIABLE]
            .into_iter()
            .map(|name| (name, var(name).ok()))
            .collect();

        // Nothing else in this crate reads these variables.
        unsafe {
            set_var(ACCOUNT_VARIABLE, "222222222222");
            remove_var(REGION_VARIABLE);
        }
        let env = Environment::from_env();

        unsafe {
            for (name, value) in &saved {
                match value {
                    Some(value) => set_var(name, value),
                    None => remove_var(name),
                }
            }
        }

        assert_eq!(
            env.account.as_ref().map(StackString::as_str),
            Some("222222222222")
        );
        assert_eq!(env.region, None);
        assert_eq!(env.assembly_environment(), "aws://222222222222/unknown-region");
    }

    #[test]
    fn test_duplicate_registration() -> Result<(), Error> {
        let mut app = App::with_outdir("unused");
        register_htsget_elsa_stack(&mut app, Environment::default())?;
        let result = register_htsget_elsa_stack(&mut app, Environment::default());
        assert!(matches!(result, Err(ElsaLibError::DuplicateStack(_))));
        assert_eq!(app.stacks().len(), 1);
        Ok(())
    }

    #[test]
    fn test_invalid_props_rejected() {
        let mut app = App::with_outdir("unused");
        let env = environment(&[(ACCOUNT_VARIABLE, "not-an-account")]);
        let result = register_htsget_elsa_stack(&mut app, env);
        assert!(matches!(result, Err(ElsaLibError::InvalidStackConfig(_))));

        let mut props = StackProps::htsget_elsa_lambda(Environment::default());
        props.stack_name = "1-starts-with-digit".into();
        let result = crate::stack::HtsgetElsaLambdaStack::new(&mut app, "Other", props);
        assert!(matches!(result, Err(ElsaLibError::InvalidStackConfig(_))));

        let mut props = StackProps::htsget_elsa_lambda(Environment::default());
        props.tags.insert("aws:reserved".into(), "value".into());
        let result = crate::stack::HtsgetElsaLambdaStack::new(&mut app, "Other", props);
        assert!(matches!(result, Err(ElsaLibError::InvalidStackConfig(_))));

        assert!(app.stacks().is_empty());
    }

    #[test]
    fn test_synth() -> Result<(), Error> {
        let outdir = TempDir::new()?;
        let mut app = App::with_outdir(outdir.path().join("cdk.out"));
        register_htsget_elsa_stack(&mut app, Environment::default())?;
        let assembly = app.synth()?;

        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(assembly.directory.join(MANIFEST_FILE))?)?;
        assert_eq!(manifest, assembly.manifest);
        let artifact = &manifest["artifacts"][STACK_NAME];
        assert_eq!(artifact["type"], "aws:cloudformation:stack");
        assert_eq!(
            artifact["environment"],
            "aws://unknown-account/unknown-region"
        );
        assert_eq!(artifact["properties"]["stackName"], STACK_NAME);
        assert_eq!(artifact["properties"]["tags"]["Stack"], STACK_NAME);

        let template_file = artifact["properties"]["templateFile"]
            .as_str()
            .expect("template file name");
        let template: serde_json::Value =
            serde_json::from_slice(&fs::read(assembly.directory.join(template_file))?)?;
        assert_eq!(template["Description"], STACK_DESCRIPTION);
        let resources = template["Resources"]
            .as_object()
            .expect("resources object");
        assert_eq!(
            resources["HtsgetElsaLambdaFunction"]["Type"],
            "AWS::Lambda::Function"
        );
        assert_eq!(
            resources["HtsgetElsaReadsRoute"]["Properties"]["RouteKey"],
            "GET /reads/{id+}"
        );
        assert_eq!(
            resources["HtsgetElsaLambdaFunction"]["Properties"]["Tags"][0]["Value"],
            STACK_NAME
        );
        Ok(())
    }
}
