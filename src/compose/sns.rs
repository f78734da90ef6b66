//! SNS event source

use super::function::FunctionContext;
use super::ident::{self, IdPrefix};
use super::modification::Modification;
use crate::error::Result;
use crate::props;
use crate::resource::{
    Props, ResourceRef, Template, Value, LAMBDA_PERMISSION, SNS_SUBSCRIPTION, SNS_TOPIC,
};

/// Where the subscribed topic comes from
#[derive(Debug)]
pub enum TopicSource {
    /// A new topic owned by the function
    Create(Modification<Props>),
    /// ARN of a topic managed elsewhere
    Existing(Value),
}

/// One topic subscription of a function
#[derive(Debug)]
pub struct SnsDecl {
    topic: TopicSource,
    permission: Modification<Props>,
    subscription: Modification<Props>,
}

impl Default for SnsDecl {
    fn default() -> Self {
        Self::new()
    }
}

impl SnsDecl {
    /// Subscribe to a new topic
    pub fn new() -> Self {
        Self {
            topic: TopicSource::Create(Modification::new()),
            permission: Modification::new(),
            subscription: Modification::new(),
        }
    }

    pub fn existing(topic_arn: impl Into<Value>) -> Self {
        Self {
            topic: TopicSource::Existing(topic_arn.into()),
            ..Self::new()
        }
    }

    /// Rewrite the created topic; no effect on an existing topic
    pub fn modify_topic(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        if let TopicSource::Create(modification) = &mut self.topic {
            modification.replace(hook);
        }
        self
    }

    pub fn modify_permission(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.permission.replace(hook);
        self
    }

    pub fn modify_subscription(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.subscription.replace(hook);
        self
    }

    pub(crate) fn build(self, template: &mut Template, ctx: &FunctionContext<'_>) -> Result<Sns> {
        let SnsDecl {
            topic,
            mut permission,
            mut subscription,
        } = self;

        let (topic, topic_arn) = match topic {
            TopicSource::Create(mut modification) => {
                let properties = modification.apply(props! {});
                let logical = ident::allocate(template, IdPrefix::SnsTopic, ctx.normalized_id);
                let topic = template.add(logical, SNS_TOPIC, properties, vec![])?;
                let arn = topic.reference();
                (Some(topic), arn)
            }
            TopicSource::Existing(arn) => (None, arn),
        };

        let properties = permission.apply(props! {
            "Action" => "lambda:InvokeFunction",
            "FunctionName" => ctx.function.reference(),
            "Principal" => "sns.amazonaws.com",
            "SourceArn" => &topic_arn,
        });
        let logical = ident::allocate(template, IdPrefix::SnsPermission, ctx.normalized_id);
        let permission = template.add(logical, LAMBDA_PERMISSION, properties, vec![])?;

        let properties = subscription.apply(props! {
            "Protocol" => "lambda",
            "TopicArn" => &topic_arn,
            "Endpoint" => ctx.lambda_arn,
        });
        let logical = ident::allocate(template, IdPrefix::SnsSubscription, ctx.normalized_id);
        let subscription = template.add(logical, SNS_SUBSCRIPTION, properties, vec![])?;
        tracing::debug!("sns subscription {} for {}", subscription.logical_name, ctx.function_id);

        Ok(Sns {
            topic,
            topic_arn,
            permission,
            subscription,
        })
    }
}

/// Emitted SNS subscription
#[derive(Debug, Clone)]
pub struct Sns {
    /// `None` for an existing topic
    pub topic: Option<ResourceRef>,
    pub topic_arn: Value,
    pub permission: ResourceRef,
    pub subscription: ResourceRef,
}
